//! Events that can occur in a conversation

use super::state::{Lens, Mode};
use crate::llm::LlmError;
use crate::quiz::QuizType;
use chrono::{DateTime, TimeDelta, Utc};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },
    SelectQuizType {
        quiz_type: QuizType,
    },
    CancelQuizSetup,
    SwitchMode {
        mode: Mode,
        /// Character to play when switching to mimic mode
        entity_name: Option<String>,
    },
    ApplyLens {
        lens: Option<Lens>,
    },
    Frustration,
    ContinueQuiz,
    UserCancel,

    // Completion events, tagged with the request they belong to
    StreamChunk {
        request_id: u64,
        text: String,
    },
    StreamComplete {
        request_id: u64,
        full_text: String,
    },
    StreamFailed {
        request_id: u64,
        error: LlmError,
    },

    // Deferred and background events
    QuizAdvance,
    TitleGenerated {
        title: String,
    },

    // Pacing timer
    TimerStart {
        duration: TimeDelta,
        at: DateTime<Utc>,
    },
    TimerPause,
    TimerResume,
    TimerStop,
    TimerTick {
        at: DateTime<Utc>,
    },
}

impl Event {
    /// High-frequency events that should not be logged individually
    pub fn is_noisy(&self) -> bool {
        matches!(self, Event::StreamChunk { .. } | Event::TimerTick { .. })
    }
}
