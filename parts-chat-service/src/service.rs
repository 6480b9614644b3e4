use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{delete, get, post},
};
use parts_flow::{
    FlowEngine, FlowStore, InMemoryFlowSessionStorage, InMemoryFlowStore, SessionKey,
    TroubleshootRunner,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::catalog::{InMemoryCatalog, PartCatalog};
use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::models::{
    CartResponse, ChatRequest, ChatResponse, EndSessionResponse, ExitResponse,
    TroubleshootAnswerRequest, TroubleshootStatus,
};
use crate::orchestrator::ChatOrchestrator;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Build the application from configuration: flows, catalog, storage and routes
pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    Ok(build_router(create_app_state(config)?))
}

pub fn create_app_state(config: &ServiceConfig) -> anyhow::Result<AppState> {
    let mut flows = InMemoryFlowStore::builtin()?;
    if let Some(dir) = &config.flows_dir {
        let loaded = flows.overlay_dir(dir)?;
        info!(dir = %dir.display(), flows = loaded, "Loaded flow definitions");
    }
    let flow_ids: Vec<String> = flows.flows().iter().map(|f| f.id().to_string()).collect();
    info!(flows = flows.len(), flow_ids = ?flow_ids, "Flow store ready");

    let catalog: Arc<dyn PartCatalog> = match &config.catalog_path {
        Some(path) => Arc::new(InMemoryCatalog::from_path(path)?),
        None => Arc::new(InMemoryCatalog::seed()?),
    };

    let runner = TroubleshootRunner::new(
        Arc::new(FlowEngine::new(Arc::new(flows))),
        Arc::new(InMemoryFlowSessionStorage::new()),
    );

    Ok(AppState::new(ChatOrchestrator::new(catalog, runner)))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/troubleshoot/answer", post(troubleshoot_answer))
        .route(
            "/troubleshoot/{session_id}",
            get(troubleshoot_status).delete(troubleshoot_exit),
        )
        .route("/cart/{session_id}", get(get_cart))
        .route("/session/{session_id}", delete(end_session))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Tag each request with a correlation id and run it inside an `http_request` span
async fn correlation_id_middleware(mut request: Request<axum::body::Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert(CORRELATION_HEADER, value.clone());
        let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
        let mut response = next.run(request).instrument(span).await;
        response.headers_mut().insert(CORRELATION_HEADER, value);
        return response;
    }

    next.run(request).await
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    if request.message.trim().is_empty() {
        return Err(ServiceError::BadRequest("message is required".to_string()));
    }

    let key = match request.session_id.as_deref() {
        Some(raw) => SessionKey::parse(raw)?,
        None => SessionKey::generate(),
    };

    info!(
        session_id = %key,
        message_length = request.message.len(),
        "Processing chat message"
    );

    let response = state.orchestrator.handle_message(&key, &request.message).await?;
    Ok(Json(response))
}

async fn troubleshoot_answer(
    State(state): State<AppState>,
    Json(request): Json<TroubleshootAnswerRequest>,
) -> Result<Json<ChatResponse>> {
    let key = SessionKey::parse(&request.session_id)?;

    info!(
        session_id = %key,
        flow_id = %request.flow_id,
        step_number = request.step_number,
        "Processing troubleshooting answer"
    );

    let response = state
        .orchestrator
        .handle_answer(&key, &request.flow_id, request.step_number, &request.answer)
        .await?;
    Ok(Json(response))
}

async fn troubleshoot_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TroubleshootStatus>> {
    let key = SessionKey::parse(&session_id)?;

    match state.orchestrator.current_step(&key).await? {
        Some(step) => Ok(Json(TroubleshootStatus {
            session_id: key.into(),
            step: (&step).into(),
        })),
        None => {
            warn!(session_id = %key, "No active troubleshooting flow");
            Err(ServiceError::NotFound(format!(
                "No active troubleshooting flow for session {key}"
            )))
        }
    }
}

async fn troubleshoot_exit(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ExitResponse>> {
    let key = SessionKey::parse(&session_id)?;
    let exited = state.orchestrator.exit_troubleshooting(&key).await?;
    info!(session_id = %key, exited, "Troubleshooting exit requested");

    Ok(Json(ExitResponse {
        session_id: key.into(),
        exited,
    }))
}

async fn get_cart(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<CartResponse>> {
    let key = SessionKey::parse(&session_id)?;
    let cart = state.orchestrator.cart(&key).await?;

    Ok(Json(CartResponse {
        session_id: key.into(),
        cart,
    }))
}

async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<EndSessionResponse>> {
    let key = SessionKey::parse(&session_id)?;
    let ended = state.orchestrator.end_session(&key).await?;

    Ok(Json(EndSessionResponse {
        session_id: key.into(),
        ended,
    }))
}
