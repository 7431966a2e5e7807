//! API request and response types

use crate::db::SessionSummary;
use crate::quiz::QuizType;
use crate::state_machine::Mode;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Request to change the pedagogical mode
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: Mode,
    /// Character to play in mimic mode
    #[serde(default)]
    pub entity_name: Option<String>,
}

/// Request to apply or clear a lens. Absent or "None" clears it.
#[derive(Debug, Deserialize)]
pub struct LensRequest {
    #[serde(default)]
    pub lens: Option<String>,
}

/// Request to choose the quiz type for the pending topic
#[derive(Debug, Deserialize)]
pub struct QuizTypeRequest {
    pub quiz_type: QuizType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Pause,
    Resume,
    Stop,
}

/// Request to control the pacing timer
#[derive(Debug, Deserialize)]
pub struct TimerRequest {
    pub action: TimerAction,
    /// Session length, required for `start`
    #[serde(default)]
    pub minutes: Option<u32>,
}

/// Response with the stored sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
