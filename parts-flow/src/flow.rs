use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::entities::ApplianceType;

/// A selectable answer for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: String,
    pub value: String,
}

/// A candidate cause with the parts that address it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cause {
    pub cause: String,
    pub confidence: f64,
    #[serde(default)]
    pub parts: Vec<String>,
}

/// What a terminal node resolves to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub causes: Vec<Cause>,
}

impl Recommendation {
    /// Every part referenced by any cause, in rank order without repeats
    pub fn parts(&self) -> Vec<&str> {
        let mut parts: Vec<&str> = Vec::new();
        for part in self.causes.iter().flat_map(|c| c.parts.iter()) {
            if !parts.contains(&part.as_str()) {
                parts.push(part);
            }
        }
        parts
    }
}

/// Where an answer leads
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(u32),
    Terminal(Arc<Recommendation>),
}

/// A validated question step
#[derive(Debug, Clone)]
pub struct Step {
    pub(crate) number: u32,
    pub(crate) question: String,
    pub(crate) options: Vec<AnswerOption>,
    pub(crate) transitions: HashMap<String, Transition>,
}

impl Step {
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// Match a submitted answer against the declared options.
    ///
    /// Values match case-insensitively; labels are accepted too so a typed
    /// "Don't know" resolves to the option whose value is `unknown`.
    pub fn resolve_answer(&self, raw: &str) -> Option<&AnswerOption> {
        let raw = raw.trim();
        self.options
            .iter()
            .find(|o| o.value.eq_ignore_ascii_case(raw))
            .or_else(|| {
                self.options
                    .iter()
                    .find(|o| o.label.eq_ignore_ascii_case(raw))
            })
    }

    pub fn transition(&self, value: &str) -> Option<&Transition> {
        self.transitions.get(value)
    }
}

/// A validated troubleshooting decision tree.
///
/// Only constructed through [`crate::FlowDefinition::validate`], so step
/// numbers are contiguous from 1, every option has a transition, every
/// transition target exists and the graph is acyclic.
#[derive(Debug, Clone)]
pub struct Flow {
    pub(crate) id: String,
    pub(crate) appliance: ApplianceType,
    pub(crate) symptom_key: String,
    pub(crate) title: Option<String>,
    pub(crate) steps: Vec<Step>,
    /// `depths[n - 1]`: longest count of question steps from step n to any terminal
    pub(crate) depths: Vec<u32>,
}

impl Flow {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn appliance(&self) -> ApplianceType {
        self.appliance
    }

    pub fn symptom_key(&self) -> &str {
        &self.symptom_key
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, number: u32) -> Option<&Step> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.steps.get(index)
    }

    pub fn first_step(&self) -> &Step {
        // validation guarantees at least one step
        &self.steps[0]
    }

    /// Longest number of question steps from `number` (inclusive) to a terminal
    pub fn remaining_depth(&self, number: u32) -> u32 {
        usize::try_from(number)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.depths.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Longest path through the whole flow
    pub fn longest_path(&self) -> u32 {
        self.remaining_depth(1)
    }
}
