use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use parts_flow::FlowError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Errors a handler can surface to the client
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Failed to load catalog: {0}")]
    Catalog(String),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Flow(FlowError::InvalidSessionKey(_))
            | ServiceError::Flow(FlowError::InvalidAnswer { .. }) => StatusCode::BAD_REQUEST,
            ServiceError::Flow(FlowError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Catalog(_) | ServiceError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
