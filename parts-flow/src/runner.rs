//! TroubleshootRunner – wraps [`FlowEngine`] and a [`FlowSessionStorage`] with the
//! _load → transition → save_ pattern, one transition per call.
//!
//! Services create one runner at startup and share it across requests:
//! ```rust,ignore
//! let runner = TroubleshootRunner::new(engine, storage);
//! let step = runner.start(&key, ApplianceType::Refrigerator, "not_making_ice").await?;
//! let progress = runner.answer(&key, &step.flow_id, step.step_number, "no").await?;
//! ```
//!
//! A completed flow is deleted from storage, so the next troubleshooting
//! message for the same conversation starts fresh.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    engine::{Advance, FlowEngine, FlowSession, FlowState, StepView, TerminalOutcome},
    entities::ApplianceType,
    error::{FlowError, Result},
    storage::{FlowSessionStorage, SessionKey},
};

/// What the caller should show after an answer
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Step(StepView),
    Complete(TerminalOutcome),
}

#[derive(Clone)]
pub struct TroubleshootRunner {
    engine: Arc<FlowEngine>,
    storage: Arc<dyn FlowSessionStorage>,
}

impl TroubleshootRunner {
    pub fn new(engine: Arc<FlowEngine>, storage: Arc<dyn FlowSessionStorage>) -> Self {
        Self { engine, storage }
    }

    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    /// Start a flow for `key`, replacing any flow already in progress
    pub async fn start(
        &self,
        key: &SessionKey,
        appliance: ApplianceType,
        symptom_key: &str,
    ) -> Result<StepView> {
        let (session, view) = self.engine.start(appliance, symptom_key)?;
        self.storage.save(key, session).await?;
        Ok(view)
    }

    /// Start the dedicated flow, or the appliance's generic flow if none exists
    pub async fn start_with_fallback(
        &self,
        key: &SessionKey,
        appliance: ApplianceType,
        symptom_key: &str,
    ) -> Result<StepView> {
        let (session, view) = self.engine.start_with_fallback(appliance, symptom_key)?;
        info!(session_id = %key, flow_id = %session.flow_id, "Troubleshooting session started");
        self.storage.save(key, session).await?;
        Ok(view)
    }

    /// Answer a step the client was shown.
    ///
    /// `flow_id` and `step_number` identify that step. If they no longer match
    /// the stored session the answer is rejected and the session is kept.
    pub async fn answer(
        &self,
        key: &SessionKey,
        flow_id: &str,
        step_number: u32,
        value: &str,
    ) -> Result<Progress> {
        let session = self
            .storage
            .get(key)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(key.to_string()))?;

        if session.flow_id != flow_id || session.current_step != step_number {
            warn!(
                session_id = %key,
                expected_flow = %session.flow_id,
                expected_step = session.current_step,
                flow_id = %flow_id,
                step_number,
                "Stale troubleshooting answer"
            );
            return Err(FlowError::InvalidAnswer {
                flow_id: flow_id.to_string(),
                step_number,
                value: value.to_string(),
            });
        }

        self.apply(key, &session, value).await
    }

    /// Answer whatever step the session is currently at
    pub async fn answer_current(&self, key: &SessionKey, value: &str) -> Result<Progress> {
        let session = self
            .storage
            .get(key)
            .await?
            .ok_or_else(|| FlowError::SessionNotFound(key.to_string()))?;
        self.apply(key, &session, value).await
    }

    /// Leave the active flow. Returns whether there was one.
    pub async fn exit(&self, key: &SessionKey) -> Result<bool> {
        let removed = self.storage.delete(key).await?;
        debug!(session_id = %key, removed, "Exited troubleshooting");
        Ok(removed)
    }

    pub async fn state(&self, key: &SessionKey) -> Result<FlowState> {
        Ok(match self.storage.get(key).await? {
            Some(session) => FlowState::AtStep(session),
            None => FlowState::AwaitingStart,
        })
    }

    /// The step the conversation is waiting on, if any
    pub async fn current(&self, key: &SessionKey) -> Result<Option<StepView>> {
        match self.storage.get(key).await? {
            Some(session) => self.engine.current_step(&session).map(Some),
            None => Ok(None),
        }
    }

    async fn apply(
        &self,
        key: &SessionKey,
        session: &FlowSession,
        value: &str,
    ) -> Result<Progress> {
        match self.engine.answer(session, value)? {
            Advance::Next { session, step } => {
                self.storage.save(key, session).await?;
                Ok(Progress::Step(step))
            }
            Advance::Complete(outcome) => {
                self.storage.delete(key).await?;
                info!(
                    session_id = %key,
                    flow_id = %outcome.flow_id,
                    total_steps = outcome.total_steps,
                    "Troubleshooting session completed"
                );
                Ok(Progress::Complete(outcome))
            }
        }
    }
}
