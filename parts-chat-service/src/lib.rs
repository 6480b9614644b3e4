pub mod cart;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod service;

pub use catalog::{InMemoryCatalog, Part, PartCatalog};
pub use config::{LogFormat, ServiceConfig};
pub use error::{ErrorResponse, ServiceError};
pub use orchestrator::ChatOrchestrator;
pub use service::{AppState, build_router, create_app, create_app_state};
