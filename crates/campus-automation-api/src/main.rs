//! Campus Automation API server
//!
//! Composition root for the automation engine: owns the engine instance,
//! drives scheduled rules from a timer and exposes the registry and dispatch
//! operations over HTTP.

use automation_engine::{
    ActionHandlers, AutomationEngine, AutomationError, CreateRuleRequest, EngineConfig,
    UpdateRuleRequest,
};
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod ticker;
mod websocket;

use config::ServerConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
}

/// API response wrapper using serde_json::Value for flexibility
#[derive(Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponse {
    fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
            error: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Map engine errors to HTTP status codes
fn error_response(e: &AutomationError) -> (StatusCode, Json<ApiResponse>) {
    let status = match e {
        AutomationError::NotFound(_) => StatusCode::NOT_FOUND,
        AutomationError::DuplicateRule(_) => StatusCode::CONFLICT,
        AutomationError::InvalidTrigger(_)
        | AutomationError::InvalidCondition(_)
        | AutomationError::InvalidAction(_)
        | AutomationError::InvalidTimeFormat(_) => StatusCode::BAD_REQUEST,
        AutomationError::HandlerFailed(_) | AutomationError::Io(_) | AutomationError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

fn not_found(id: &str) -> (StatusCode, Json<ApiResponse>) {
    error_response(&AutomationError::NotFound(id.to_string()))
}

/// List all rules
async fn list_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.get_rules().await))
}

/// List rules visible to dispatch
async fn list_active_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.get_active_rules().await))
}

/// Get a specific rule
async fn get_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.get_rule(&id).await {
        Some(rule) => (StatusCode::OK, Json(ApiResponse::success(rule))),
        None => not_found(&id),
    }
}

/// Register a rule
async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> impl IntoResponse {
    match state.engine.add_rule(request).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(serde_json::json!({ "id": id }))),
        ),
        Err(e) => error_response(&e),
    }
}

/// Merge an update into a rule
async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UpdateRuleRequest>,
) -> impl IntoResponse {
    match state.engine.update_rule(&id, update).await {
        Ok(true) => match state.engine.get_rule(&id).await {
            Some(rule) => (StatusCode::OK, Json(ApiResponse::success(rule))),
            None => not_found(&id),
        },
        Ok(false) => not_found(&id),
        Err(e) => error_response(&e),
    }
}

/// Remove a rule
async fn delete_rule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.engine.remove_rule(&id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "removed": id }))),
        ),
        Ok(false) => not_found(&id),
        Err(e) => error_response(&e),
    }
}

/// Execute a single rule against a context
async fn execute_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(context): Json<Value>,
) -> impl IntoResponse {
    let executed = state.engine.execute_rule(&id, &context).await;
    Json(ApiResponse::success(serde_json::json!({
        "id": id,
        "executed": executed
    })))
}

/// Dispatch a host event
async fn trigger_event(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(context): Json<Value>,
) -> impl IntoResponse {
    let executed = state.engine.trigger_event(&name, &context).await;
    Json(ApiResponse::success(serde_json::json!({
        "event": name,
        "executed": executed
    })))
}

/// Run due scheduled rules now
async fn run_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let executed = state.engine.process_scheduled_rules().await;
    Json(ApiResponse::success(serde_json::json!({ "executed": executed })))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket::handle_socket(socket, state))
}

/// Health check
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/rules", get(list_rules).post(create_rule))
        .route("/api/v1/rules/active", get(list_active_rules))
        .route(
            "/api/v1/rules/:id",
            get(get_rule).patch(update_rule).delete(delete_rule),
        )
        .route("/api/v1/rules/:id/execute", post(execute_rule))
        .route("/api/v1/events/:name", post(trigger_event))
        .route("/api/v1/schedule/run", post(run_schedule))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campus_automation_api=debug,automation_engine=debug,automation=info,info".into()
            }),
        )
        .init();

    tracing::info!("Starting Campus Automation API server");

    let config = ServerConfig::from_env()?;
    tracing::info!("Rules stored under {:?}", config.data_dir);

    let engine_config =
        EngineConfig::persistent(&config.data_dir).with_default_rules(config.default_rules);
    let engine = Arc::new(AutomationEngine::new(engine_config, ActionHandlers::default()).await?);

    let active = engine.get_active_rules().await.len();
    tracing::info!("Automation engine ready with {} active rules", active);

    let _ticker = ticker::spawn(engine.clone(), config.tick_interval);
    tracing::info!("Schedule ticker every {:?}", config.tick_interval);

    let app = router(AppState { engine });

    tracing::info!("Listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
