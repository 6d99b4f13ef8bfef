use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{Next, from_fn},
    response::{Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use triage_flow::{Assessment, ChatReply, ChatRequest, IntakeRunner, TriageError};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    workflow::{build_intake_runner, create_assessment_store, create_inference},
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str, details: &str) -> ApiError {
    (
        status,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn triage_error(err: TriageError) -> ApiError {
    let details = err.to_string();
    match err {
        TriageError::InvalidRequest(_) => {
            api_error(StatusCode::BAD_REQUEST, "Invalid request", &details)
        }
        TriageError::ConversationFinished => api_error(
            StatusCode::CONFLICT,
            "This conversation has already finished",
            &details,
        ),
        TriageError::InferenceFailure(_) => api_error(
            StatusCode::BAD_GATEWAY,
            "The assistant is unavailable right now, please try again",
            &details,
        ),
        TriageError::PersistenceFailure(_) | TriageError::Other(_) => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong while processing your request",
            &details,
        ),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub runner: IntakeRunner,
}

pub async fn create_app(config: &ServiceConfig) -> Router {
    let store = create_assessment_store(config.database_url.as_deref()).await;
    let inference = create_inference(config);
    let runner = build_intake_runner(inference, store, config.controller_config());
    build_router(AppState { runner })
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/triage/chat", post(chat))
        .route("/api/v1/assessments", get(list_assessments))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Tags every request with a fresh correlation ID, both in a tracing span and
/// in the request and response headers
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Clinical Triage Assistant",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Symptom intake conversation with nurse/doctor triage and ESI scoring",
        "endpoints": {
            "POST /api/v1/triage/chat": "Send one patient message, receive the assistant reply",
            "GET /api/v1/assessments": "List completed assessments, newest first",
            "GET /health": "Health check"
        }
    }))
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
) -> ApiResult<ChatReply> {
    info!(
        history_len = request.history.len(),
        message_len = request.message.len(),
        "Processing chat request"
    );

    match state.runner.handle(request).await {
        Ok(reply) => {
            if reply.finished {
                info!(
                    finish_reason = ?reply.finish_reason,
                    esi_level = ?reply.esi_level,
                    assessment_id = ?reply.assessment_id,
                    "Intake conversation finished"
                );
            }
            Ok(Json(reply))
        }
        Err(e) => {
            match &e {
                TriageError::InvalidRequest(_) | TriageError::ConversationFinished => {
                    warn!(error = %e, "Rejected chat request")
                }
                _ => error!(error = %e, "Chat request failed"),
            }
            Err(triage_error(e))
        }
    }
}

async fn list_assessments(State(state): State<AppState>) -> ApiResult<Vec<Assessment>> {
    state.runner.store().list_assessments().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to list assessments");
        triage_error(e)
    })
}
