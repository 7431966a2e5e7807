//! Effects produced by state transitions

use crate::db::{Message, Session};
use crate::llm::{LlmError, LlmErrorKind};
use crate::quiz::QuizRecord;
use crate::system_prompt::PromptContext;
use serde::Serialize;
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone)]
pub enum Effect {
    /// Append a message to the session
    AppendMessage(Message),

    /// Append one streamed fragment to a message's content
    AppendFragment { message_id: String, text: String },

    /// Commit the final content (and quiz payload) of a streamed message
    FinalizeMessage {
        message_id: String,
        content: String,
        quiz: Option<QuizRecord>,
    },

    /// Drop messages from the session
    RemoveMessages { ids: Vec<String> },

    /// Replace the session title
    SetTitle { title: String },

    /// Save the session, minus any message still streaming
    PersistSession,

    /// Start streaming a completion into the placeholder
    RequestCompletion(CompletionPlan),

    /// Cancel the in-flight completion
    AbortCompletion,

    /// Ask for a better title in the background
    GenerateTitle { text: String },

    /// Emit `QuizAdvance` after a short pause so feedback stays visible
    ScheduleQuizAdvance { delay: Duration },

    /// Notify observers
    Notify(EngineEvent),
}

impl Effect {
    /// Apply the message-list part of this effect to the session.
    /// Returns false for effects that only touch the outside world.
    pub fn apply(&self, session: &mut Session) -> bool {
        match self {
            Effect::AppendMessage(message) => {
                session.last_message_at = message.timestamp;
                session.messages.push(message.clone());
                if message.is_visible_user() && session.user_message_count() == 1 {
                    session.refresh_title();
                }
                true
            }
            Effect::AppendFragment { message_id, text } => {
                if let Some(message) = session.message_mut(message_id) {
                    message.content.push_str(text);
                }
                true
            }
            Effect::FinalizeMessage {
                message_id,
                content,
                quiz,
            } => {
                if let Some(message) = session.message_mut(message_id) {
                    message.content.clone_from(content);
                    message.quiz.clone_from(quiz);
                }
                true
            }
            Effect::RemoveMessages { ids } => {
                session.messages.retain(|m| !ids.contains(&m.id));
                true
            }
            Effect::SetTitle { title } => {
                session.title.clone_from(title);
                true
            }
            Effect::PersistSession
            | Effect::RequestCompletion(_)
            | Effect::AbortCompletion
            | Effect::GenerateTitle { .. }
            | Effect::ScheduleQuizAdvance { .. }
            | Effect::Notify(_) => false,
        }
    }
}

/// Everything needed to issue one completion request. History is taken from
/// the session at execution time: every message before the placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionPlan {
    pub request_id: u64,
    pub placeholder_id: String,
    /// Prompt inputs; the pacing directive is filled in when the request is sent
    pub prompt: PromptContext,
}

/// Engine notifications for observers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Quiz mode needs a quiz type before the topic can be sent
    QuizTypeRequested { topic: String },
    /// A malformed quiz reply is being retried
    QuizRetrying { attempt: u32, reason: String },
    /// Retries are exhausted and the exchange was abandoned
    QuizFailed { message: String },
    QuizCompleted {
        score: String,
        percentage: u8,
        strengths: Vec<String>,
        weaknesses: Vec<String>,
        improvement_plan: String,
    },
    TimerExpired,
    Error(ErrorNotice),
}

/// User-facing classification of a failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorNotice {
    /// No connectivity; try again
    Connectivity { message: String },
    /// Credentials or setup problem; retrying will not help
    Configuration { message: String },
    /// Wait, then try again
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },
    /// Anything else, with the service's message appended
    Service { message: String },
}

impl ErrorNotice {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorNotice::Configuration { .. })
    }
}

impl From<&LlmError> for ErrorNotice {
    fn from(error: &LlmError) -> Self {
        match error.kind {
            LlmErrorKind::Unreachable => ErrorNotice::Connectivity {
                message: "Unable to reach the tutoring service. Check your connection and try again.".to_string(),
            },
            LlmErrorKind::Credentials => ErrorNotice::Configuration {
                message: "The tutoring service rejected the credentials. Check ANTHROPIC_API_KEY and restart.".to_string(),
            },
            LlmErrorKind::Throttled => {
                let retry_after_secs = error.retry_after.map(|d| d.as_secs().max(1));
                let message = match retry_after_secs {
                    Some(secs) => format!("Too many requests. Please wait {secs} seconds and try again."),
                    None => "Too many requests. Please wait a moment and try again.".to_string(),
                };
                ErrorNotice::RateLimited {
                    message,
                    retry_after_secs,
                }
            }
            LlmErrorKind::Service | LlmErrorKind::Rejected | LlmErrorKind::Unclassified => {
                ErrorNotice::Service {
                    message: format!("Something went wrong: {}", error.message),
                }
            }
        }
    }
}
