pub mod definition;
pub mod engine;
pub mod entities;
pub mod error;
pub mod extract;
pub mod flow;
pub mod intent;
pub mod runner;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use definition::{FlowDefinition, FlowDocument, StepDefinition, TransitionDefinition};
pub use engine::{
    Advance, AnswerRecord, FlowEngine, FlowSession, FlowState, StepView, TerminalOutcome,
};
pub use entities::{ApplianceType, Entities, Symptom, extract_entities};
pub use error::{FlowError, Result};
pub use extract::{Extraction, extract};
pub use flow::{AnswerOption, Cause, Flow, Recommendation, Step, Transition};
pub use intent::{Intent, IntentMatch, MatchSource, classify};
pub use runner::{Progress, TroubleshootRunner};
pub use storage::{FlowSessionStorage, InMemoryFlowSessionStorage, SessionKey};
pub use store::{FlowStore, GENERIC_SYMPTOM_KEY, InMemoryFlowStore};
