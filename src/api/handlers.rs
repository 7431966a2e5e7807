//! HTTP request handlers
//!
//! Commands are queued to the session's runtime and acknowledged right away.
//! Their outcome (including rejections) arrives on the session's SSE stream.

use super::sse::sse_stream;
use super::types::{
    CancelResponse, ChatRequest, ChatResponse, ErrorResponse, LensRequest, ModeRequest,
    QuizTypeRequest, SessionListResponse, SuccessResponse, TimerAction, TimerRequest,
};
use super::AppState;
use crate::presentation::{catalog, find_lens, Catalog};
use crate::runtime::{RuntimeError, SessionSnapshot, SseEvent};
use crate::state_machine::Event;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeDelta, Utc};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session listing and lifecycle
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/new", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/delete", post(delete_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User actions
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/cancel", post(cancel_request))
        .route("/api/sessions/:id/mode", post(switch_mode))
        .route("/api/sessions/:id/lens", post(apply_lens))
        .route("/api/sessions/:id/frustration", post(frustration))
        // Quiz flow
        .route("/api/sessions/:id/quiz-type", post(select_quiz_type))
        .route("/api/sessions/:id/quiz-cancel", post(cancel_quiz_setup))
        .route("/api/sessions/:id/quiz-continue", post(continue_quiz))
        // Pacing timer
        .route("/api/sessions/:id/timer", post(control_timer))
        // Display metadata
        .route("/api/catalog", get(get_catalog))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.runtime.list_sessions().await?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn create_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.runtime.create_session().await)
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.runtime.snapshot(&id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.delete_session(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (snapshot, broadcast_rx) = state.runtime.subscribe(&id).await?;
    Ok(sse_stream(SseEvent::Init { snapshot }, broadcast_rx))
}

// ============================================================
// User Actions
// ============================================================

/// Queue one event for the session
async fn queue(state: &AppState, id: &str, event: Event) -> Result<Json<ChatResponse>, AppError> {
    state.runtime.send_event(id, event).await?;
    Ok(Json(ChatResponse { queued: true }))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message is empty".to_string()));
    }
    queue(&state, &id, Event::UserMessage { text: req.text }).await
}

async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    state.runtime.send_event(&id, Event::UserCancel).await?;
    Ok(Json(CancelResponse { ok: true }))
}

async fn switch_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let event = Event::SwitchMode {
        mode: req.mode,
        entity_name: req.entity_name,
    };
    queue(&state, &id, event).await
}

async fn apply_lens(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LensRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let lens = match req.lens.as_deref() {
        None => None,
        Some(name) => Some(
            find_lens(name)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown lens: {name}")))?
                .to_lens(),
        ),
    };
    queue(&state, &id, Event::ApplyLens { lens }).await
}

async fn frustration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    queue(&state, &id, Event::Frustration).await
}

// ============================================================
// Quiz Flow
// ============================================================

async fn select_quiz_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QuizTypeRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let event = Event::SelectQuizType {
        quiz_type: req.quiz_type,
    };
    queue(&state, &id, event).await
}

async fn cancel_quiz_setup(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    queue(&state, &id, Event::CancelQuizSetup).await
}

async fn continue_quiz(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChatResponse>, AppError> {
    queue(&state, &id, Event::ContinueQuiz).await
}

// ============================================================
// Pacing Timer
// ============================================================

async fn control_timer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TimerRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let event = timer_event(&req)?;
    queue(&state, &id, event).await
}

fn timer_event(req: &TimerRequest) -> Result<Event, AppError> {
    let at = Utc::now();
    let event = match req.action {
        TimerAction::Start => {
            let minutes = req
                .minutes
                .filter(|m| *m > 0)
                .ok_or_else(|| AppError::BadRequest("Timer needs a positive minutes value".to_string()))?;
            Event::TimerStart {
                duration: TimeDelta::minutes(i64::from(minutes)),
                at,
            }
        }
        TimerAction::Pause => Event::TimerPause,
        TimerAction::Resume => Event::TimerResume,
        TimerAction::Stop => Event::TimerStop,
    };
    Ok(event)
}

// ============================================================
// Metadata
// ============================================================

async fn get_catalog() -> Json<Catalog> {
    Json(catalog())
}

async fn get_version() -> &'static str {
    concat!("tutor-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RuntimeError> for AppError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::SessionNotFound(_) => AppError::NotFound(error.to_string()),
            RuntimeError::Storage(_) | RuntimeError::Stopped(_) => {
                tracing::error!(error = %error, "Request failed");
                AppError::Internal(error.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
