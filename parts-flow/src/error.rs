use thiserror::Error;

use crate::entities::ApplianceType;

/// Errors raised by flow loading, the flow engine and session storage
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("No troubleshooting flow registered for {appliance} / {symptom_key}")]
    FlowNotFound {
        appliance: ApplianceType,
        symptom_key: String,
    },

    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Answer '{value}' is not valid for step {step_number} of flow {flow_id}")]
    InvalidAnswer {
        flow_id: String,
        step_number: u32,
        value: String,
    },

    #[error("Invalid flow definition '{flow_id}': {reason}")]
    InvalidDefinition { flow_id: String, reason: String },

    #[error("Invalid session id: {0}")]
    InvalidSessionKey(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Failed to read flow definitions: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON flow definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML flow definition: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    pub(crate) fn invalid_definition(flow_id: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidDefinition {
            flow_id: flow_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Conditions a conversation can recover from by re-prompting, restarting
    /// or answering without a flow.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FlowError::FlowNotFound { .. }
                | FlowError::UnknownFlow(_)
                | FlowError::InvalidAnswer { .. }
                | FlowError::SessionNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
