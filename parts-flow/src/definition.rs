//! Serialized form of troubleshooting flows and their load-time validation.
//!
//! Definitions arrive as JSON or YAML. [`FlowDefinition::validate`] turns one
//! into a [`Flow`] or rejects it, so a malformed graph never reaches a
//! conversation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::entities::{ApplianceType, is_part_number};
use crate::error::{FlowError, Result};
use crate::flow::{AnswerOption, Flow, Recommendation, Step, Transition};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowDefinition {
    pub flow_id: String,
    pub appliance_type: ApplianceType,
    pub symptom_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub step_number: u32,
    pub question: String,
    pub options: Vec<AnswerOption>,
    pub transitions: BTreeMap<String, TransitionDefinition>,
}

/// Exactly one of `step` or `terminal` must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<Recommendation>,
}

impl TransitionDefinition {
    pub fn to_step(step: u32) -> Self {
        Self {
            step: Some(step),
            terminal: None,
        }
    }

    pub fn to_terminal(recommendation: Recommendation) -> Self {
        Self {
            step: None,
            terminal: Some(recommendation),
        }
    }
}

/// A definitions file holds either one flow or a `flows` list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FlowDocument {
    Many { flows: Vec<FlowDefinition> },
    One(FlowDefinition),
}

impl FlowDocument {
    pub fn from_json(raw: &str) -> Result<Vec<FlowDefinition>> {
        Ok(serde_json::from_str::<FlowDocument>(raw)?.into_definitions())
    }

    pub fn from_yaml(raw: &str) -> Result<Vec<FlowDefinition>> {
        Ok(serde_yaml::from_str::<FlowDocument>(raw)?.into_definitions())
    }

    pub fn into_definitions(self) -> Vec<FlowDefinition> {
        match self {
            FlowDocument::Many { flows } => flows,
            FlowDocument::One(flow) => vec![flow],
        }
    }
}

impl FlowDefinition {
    /// Check every structural invariant and build the immutable [`Flow`]
    pub fn validate(self) -> Result<Flow> {
        let id = self.flow_id.trim().to_string();
        if id.is_empty() {
            return Err(FlowError::invalid_definition("<unnamed>", "flow_id is empty"));
        }
        if self.symptom_key.trim().is_empty() {
            return Err(FlowError::invalid_definition(&id, "symptom_key is empty"));
        }
        if self.steps.is_empty() {
            return Err(FlowError::invalid_definition(&id, "flow has no steps"));
        }

        let step_count = self.steps.len() as u32;
        for (index, step) in self.steps.iter().enumerate() {
            let expected = index as u32 + 1;
            if step.step_number != expected {
                return Err(FlowError::invalid_definition(
                    &id,
                    format!(
                        "steps must be numbered 1..{step_count} in order, found {} at position {expected}",
                        step.step_number
                    ),
                ));
            }
        }

        let steps = self
            .steps
            .into_iter()
            .map(|step| validate_step(&id, step, step_count))
            .collect::<Result<Vec<_>>>()?;

        let depths = compute_depths(&id, &steps)?;
        warn_unreachable(&id, &steps);

        Ok(Flow {
            id,
            appliance: self.appliance_type,
            symptom_key: self.symptom_key.trim().to_string(),
            title: self.title,
            steps,
            depths,
        })
    }
}

fn validate_step(flow_id: &str, step: StepDefinition, step_count: u32) -> Result<Step> {
    let number = step.step_number;
    let fail = |reason: String| {
        FlowError::invalid_definition(flow_id, format!("step {number}: {reason}"))
    };

    if step.question.trim().is_empty() {
        return Err(fail("question is empty".into()));
    }
    if step.options.is_empty() {
        return Err(fail("no answer options".into()));
    }

    let mut seen = HashSet::new();
    for option in &step.options {
        if option.value.trim().is_empty() {
            return Err(fail(format!("option '{}' has an empty value", option.label)));
        }
        if !seen.insert(option.value.to_lowercase()) {
            return Err(fail(format!("duplicate option value '{}'", option.value)));
        }
        if !step.transitions.contains_key(&option.value) {
            return Err(fail(format!("option '{}' has no transition", option.value)));
        }
    }

    let mut transitions = HashMap::with_capacity(step.transitions.len());
    for (value, definition) in step.transitions {
        if !step.options.iter().any(|o| o.value == value) {
            return Err(fail(format!("transition '{value}' is not a declared option")));
        }
        let transition = match (definition.step, definition.terminal) {
            (Some(target), None) => {
                if target == 0 || target > step_count {
                    return Err(fail(format!(
                        "transition '{value}' points to missing step {target}"
                    )));
                }
                if target == number {
                    return Err(fail(format!("transition '{value}' points back to itself")));
                }
                Transition::Next(target)
            }
            (None, Some(recommendation)) => {
                let recommendation = validate_recommendation(recommendation)
                    .map_err(|reason| fail(format!("terminal for '{value}': {reason}")))?;
                Transition::Terminal(Arc::new(recommendation))
            }
            (Some(_), Some(_)) => {
                return Err(fail(format!(
                    "transition '{value}' sets both a step and a terminal"
                )));
            }
            (None, None) => {
                return Err(fail(format!("transition '{value}' has no target")));
            }
        };
        transitions.insert(value, transition);
    }

    Ok(Step {
        number,
        question: step.question,
        options: step.options,
        transitions,
    })
}

fn validate_recommendation(
    mut recommendation: Recommendation,
) -> std::result::Result<Recommendation, String> {
    if recommendation.causes.is_empty() {
        return Err("no causes".into());
    }
    for cause in &mut recommendation.causes {
        if cause.cause.trim().is_empty() {
            return Err("cause text is empty".into());
        }
        if !(0.0..=1.0).contains(&cause.confidence) {
            return Err(format!(
                "confidence {} for '{}' is outside [0, 1]",
                cause.confidence, cause.cause
            ));
        }
        for part in &mut cause.parts {
            if !is_part_number(part) {
                return Err(format!("'{part}' is not a part number"));
            }
            *part = part.to_uppercase();
        }
    }
    // ranked: highest confidence first, authoring order among ties
    recommendation
        .causes
        .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(recommendation)
}

#[derive(Clone, Copy, PartialEq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

/// Longest question count from each step to a terminal; rejects cycles
fn compute_depths(flow_id: &str, steps: &[Step]) -> Result<Vec<u32>> {
    fn visit(
        flow_id: &str,
        steps: &[Step],
        index: usize,
        marks: &mut [Visit],
        depths: &mut [u32],
    ) -> Result<u32> {
        match marks[index] {
            Visit::Done => return Ok(depths[index]),
            Visit::InProgress => {
                return Err(FlowError::invalid_definition(
                    flow_id,
                    format!("step {} is part of a cycle", index + 1),
                ));
            }
            Visit::Unvisited => {}
        }
        marks[index] = Visit::InProgress;

        let mut longest = 0;
        for transition in steps[index].transitions.values() {
            if let Transition::Next(target) = transition {
                let below = visit(flow_id, steps, *target as usize - 1, marks, depths)?;
                longest = longest.max(below);
            }
        }

        marks[index] = Visit::Done;
        depths[index] = longest + 1;
        Ok(depths[index])
    }

    let mut marks = vec![Visit::Unvisited; steps.len()];
    let mut depths = vec![0; steps.len()];
    for index in 0..steps.len() {
        visit(flow_id, steps, index, &mut marks, &mut depths)?;
    }
    Ok(depths)
}

fn warn_unreachable(flow_id: &str, steps: &[Step]) {
    let mut reachable = vec![false; steps.len()];
    let mut stack = vec![1u32];
    while let Some(number) = stack.pop() {
        let index = number as usize - 1;
        if std::mem::replace(&mut reachable[index], true) {
            continue;
        }
        stack.extend(steps[index].transitions.values().filter_map(|t| match t {
            Transition::Next(target) => Some(*target),
            Transition::Terminal(_) => None,
        }));
    }

    for (index, _) in reachable.iter().enumerate().filter(|(_, r)| !**r) {
        warn!(
            flow_id = %flow_id,
            step_number = index + 1,
            "Flow step is unreachable from step 1"
        );
    }
}
