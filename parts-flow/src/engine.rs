//! The troubleshooting state machine.
//!
//! [`FlowEngine`] holds no per-conversation state. Every operation takes the
//! current [`FlowSession`] by reference and returns the next one, so a rejected
//! answer leaves the caller's session exactly as it was.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entities::ApplianceType;
use crate::error::{FlowError, Result};
use crate::flow::{AnswerOption, Cause, Flow, Step, Transition};
use crate::store::{FlowStore, GENERIC_SYMPTOM_KEY};

/// One accepted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub step_number: u32,
    pub value: String,
}

/// Position of one conversation inside a flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSession {
    pub flow_id: String,
    pub current_step: u32,
    pub answers: Vec<AnswerRecord>,
    pub started_at: DateTime<Utc>,
}

/// A question to show the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub flow_id: String,
    pub step_number: u32,
    pub total_steps: u32,
    pub question: String,
    pub options: Vec<AnswerOption>,
}

/// The recommendation a flow ended on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutcome {
    pub flow_id: String,
    pub total_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub causes: Vec<Cause>,
    pub answers: Vec<AnswerRecord>,
}

impl TerminalOutcome {
    /// Part numbers across all causes, highest ranked first
    pub fn parts(&self) -> Vec<String> {
        let mut parts: Vec<String> = Vec::new();
        for part in self.causes.iter().flat_map(|c| c.parts.iter()) {
            if !parts.contains(part) {
                parts.push(part.clone());
            }
        }
        parts
    }
}

/// Result of a successful answer
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next { session: FlowSession, step: StepView },
    Complete(TerminalOutcome),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlowState {
    AwaitingStart,
    AtStep(FlowSession),
    Terminal(TerminalOutcome),
}

impl FlowState {
    pub fn is_active(&self) -> bool {
        matches!(self, FlowState::AtStep(_))
    }
}

#[derive(Clone)]
pub struct FlowEngine {
    store: Arc<dyn FlowStore>,
}

impl FlowEngine {
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    /// Begin the flow registered for `(appliance, symptom_key)` at step 1
    pub fn start(
        &self,
        appliance: ApplianceType,
        symptom_key: &str,
    ) -> Result<(FlowSession, StepView)> {
        let flow = self
            .store
            .find(appliance, symptom_key)
            .ok_or_else(|| FlowError::FlowNotFound {
                appliance,
                symptom_key: symptom_key.to_string(),
            })?;

        let session = FlowSession {
            flow_id: flow.id().to_string(),
            current_step: 1,
            answers: Vec::new(),
            started_at: Utc::now(),
        };
        let view = step_view(&flow, flow.first_step(), 0);

        info!(
            flow_id = %flow.id(),
            appliance = %appliance,
            symptom_key = %symptom_key,
            total_steps = view.total_steps,
            "Started troubleshooting flow"
        );
        Ok((session, view))
    }

    /// Like [`FlowEngine::start`], retrying with the appliance's generic flow
    pub fn start_with_fallback(
        &self,
        appliance: ApplianceType,
        symptom_key: &str,
    ) -> Result<(FlowSession, StepView)> {
        match self.start(appliance, symptom_key) {
            Err(FlowError::FlowNotFound { .. }) if symptom_key != GENERIC_SYMPTOM_KEY => {
                debug!(
                    appliance = %appliance,
                    symptom_key = %symptom_key,
                    "No dedicated flow, falling back to generic flow"
                );
                self.start(appliance, GENERIC_SYMPTOM_KEY)
            }
            other => other,
        }
    }

    /// Apply an answer to the session's current step
    pub fn answer(&self, session: &FlowSession, value: &str) -> Result<Advance> {
        let flow = self.flow(&session.flow_id)?;
        let invalid = || FlowError::InvalidAnswer {
            flow_id: session.flow_id.clone(),
            step_number: session.current_step,
            value: value.to_string(),
        };

        let step = flow.step(session.current_step).ok_or_else(invalid)?;
        let option = match step.resolve_answer(value) {
            Some(option) => option,
            None => {
                warn!(
                    flow_id = %session.flow_id,
                    step_number = session.current_step,
                    value = %value,
                    "Rejected answer that is not an option of the current step"
                );
                return Err(invalid());
            }
        };
        let transition = step.transition(&option.value).ok_or_else(invalid)?;

        let mut answers = session.answers.clone();
        answers.push(AnswerRecord {
            step_number: step.number(),
            value: option.value.clone(),
        });

        match transition {
            Transition::Next(next_number) => {
                let next = flow.step(*next_number).ok_or_else(invalid)?;
                let view = step_view(&flow, next, answers.len() as u32);
                debug!(
                    flow_id = %flow.id(),
                    from_step = step.number(),
                    to_step = next.number(),
                    answer = %option.value,
                    "Advanced troubleshooting flow"
                );
                Ok(Advance::Next {
                    session: FlowSession {
                        flow_id: session.flow_id.clone(),
                        current_step: next.number(),
                        answers,
                        started_at: session.started_at,
                    },
                    step: view,
                })
            }
            Transition::Terminal(recommendation) => {
                info!(
                    flow_id = %flow.id(),
                    steps_taken = answers.len(),
                    causes = recommendation.causes.len(),
                    "Troubleshooting flow reached a recommendation"
                );
                Ok(Advance::Complete(TerminalOutcome {
                    flow_id: session.flow_id.clone(),
                    total_steps: answers.len() as u32,
                    summary: recommendation.summary.clone(),
                    causes: recommendation.causes.clone(),
                    answers,
                }))
            }
        }
    }

    /// Re-render the step a session is waiting on
    pub fn current_step(&self, session: &FlowSession) -> Result<StepView> {
        let flow = self.flow(&session.flow_id)?;
        let step = flow
            .step(session.current_step)
            .ok_or_else(|| FlowError::InvalidAnswer {
                flow_id: session.flow_id.clone(),
                step_number: session.current_step,
                value: String::new(),
            })?;
        Ok(step_view(&flow, step, session.answers.len() as u32))
    }

    /// Drop whatever state a conversation was in. Always succeeds.
    pub fn exit(&self, state: FlowState) -> FlowState {
        if let FlowState::AtStep(session) = &state {
            debug!(flow_id = %session.flow_id, step_number = session.current_step, "Exited flow");
        }
        FlowState::AwaitingStart
    }

    fn flow(&self, flow_id: &str) -> Result<Arc<Flow>> {
        self.store
            .get(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))
    }
}

/// `total_steps` is relative to the path taken: answers so far plus the
/// longest remaining path from this step
fn step_view(flow: &Flow, step: &Step, answered: u32) -> StepView {
    StepView {
        flow_id: flow.id().to_string(),
        step_number: step.number(),
        total_steps: answered + flow.remaining_depth(step.number()),
        question: step.question().to_string(),
        options: step.options().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFlowStore;

    fn engine() -> FlowEngine {
        FlowEngine::new(Arc::new(InMemoryFlowStore::builtin().unwrap()))
    }

    #[test]
    fn test_start_at_step_one() {
        let (session, view) = engine()
            .start(ApplianceType::Refrigerator, "not_making_ice")
            .unwrap();
        assert_eq!(session.current_step, 1);
        assert!(session.answers.is_empty());
        assert_eq!(view.step_number, 1);
        assert_eq!(view.total_steps, 3);
        assert_eq!(view.question, "Is water reaching the ice maker?");
    }

    #[test]
    fn test_start_unknown_pair_is_flow_not_found() {
        let err = engine()
            .start(ApplianceType::Dishwasher, "not_making_ice")
            .unwrap_err();
        assert!(matches!(err, FlowError::FlowNotFound { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_start_with_fallback_uses_generic_flow() {
        let (session, _) = engine()
            .start_with_fallback(ApplianceType::Dishwasher, "noisy")
            .unwrap();
        assert_eq!(session.flow_id, "dishwasher_generic");
    }

    #[test]
    fn test_invalid_answer_leaves_session_untouched() {
        let engine = engine();
        let (session, _) = engine
            .start(ApplianceType::Refrigerator, "not_making_ice")
            .unwrap();
        let snapshot = session.clone();

        let err = engine.answer(&session, "maybe").unwrap_err();
        assert!(matches!(
            err,
            FlowError::InvalidAnswer { step_number: 1, .. }
        ));
        assert_eq!(session, snapshot);

        // same input, same failure
        assert!(engine.answer(&session, "maybe").is_err());
    }

    #[test]
    fn test_answer_accepts_labels_and_case() {
        let engine = engine();
        let (session, _) = engine
            .start(ApplianceType::Refrigerator, "not_making_ice")
            .unwrap();

        match engine.answer(&session, "Don't know").unwrap() {
            Advance::Next { session, .. } => {
                assert_eq!(session.answers[0].value, "unknown");
            }
            other => panic!("expected next step, got {other:?}"),
        }
        assert!(matches!(
            engine.answer(&session, "YES").unwrap(),
            Advance::Next { .. }
        ));
    }

    #[test]
    fn test_total_steps_follow_the_path() {
        let engine = engine();
        let (session, view) = engine
            .start(ApplianceType::Refrigerator, "not_cooling")
            .unwrap();
        assert_eq!(view.total_steps, 3);

        let Advance::Next { session, step } = engine.answer(&session, "yes").unwrap() else {
            panic!("expected step 2");
        };
        assert_eq!(step.step_number, 2);
        assert_eq!(step.total_steps, 3);

        // blocked vents end the flow after two questions
        let Advance::Complete(outcome) = engine.answer(&session, "yes").unwrap() else {
            panic!("expected terminal");
        };
        assert_eq!(outcome.total_steps, 2);
        assert_eq!(outcome.answers.len(), 2);
    }

    #[test]
    fn test_exit_always_returns_awaiting_start() {
        let engine = engine();
        assert_eq!(engine.exit(FlowState::AwaitingStart), FlowState::AwaitingStart);

        let (session, _) = engine
            .start(ApplianceType::Dishwasher, "not_draining")
            .unwrap();
        let state = engine.exit(FlowState::AtStep(session));
        assert!(!state.is_active());
    }

    #[test]
    fn test_session_for_unknown_flow() {
        let session = FlowSession {
            flow_id: "retired_flow".into(),
            current_step: 1,
            answers: vec![],
            started_at: Utc::now(),
        };
        assert!(matches!(
            engine().answer(&session, "yes"),
            Err(FlowError::UnknownFlow(_))
        ));
    }
}
