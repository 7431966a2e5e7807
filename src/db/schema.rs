//! Database schema and types

pub use crate::llm::MessageRole;
use crate::quiz::QuizRecord;
use crate::state_machine::state::{Lens, Mode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL,
    last_message_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_last_message ON sessions(last_message_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    body TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, position);
";

pub const DEFAULT_TITLE: &str = "New Chat";
const MAX_TITLE_CHARS: usize = 50;
const MAX_PREVIEW_CHARS: usize = 100;

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Grows fragment by fragment while a response streams in
    pub content: String,
    pub role: MessageRole,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizRecord>,
    /// Sent to the completion service, never rendered
    #[serde(default)]
    pub is_hidden: bool,
}

impl Message {
    fn new(role: MessageRole, content: impl Into<String>, mode: Mode, lens: Option<&Lens>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
            mode,
            lens: lens.map(|l| l.name.clone()),
            quiz: None,
            is_hidden: false,
        }
    }

    pub fn user(content: impl Into<String>, mode: Mode, lens: Option<&Lens>) -> Self {
        Self::new(MessageRole::User, content, mode, lens)
    }

    /// A user-role control turn the UI never shows
    pub fn hidden(content: impl Into<String>, mode: Mode, lens: Option<&Lens>) -> Self {
        Self {
            is_hidden: true,
            ..Self::new(MessageRole::User, content, mode, lens)
        }
    }

    /// Empty assistant turn that receives streamed fragments
    pub fn placeholder(mode: Mode, lens: Option<&Lens>) -> Self {
        Self::new(MessageRole::Assistant, String::new(), mode, lens)
    }

    /// A real, typed user message
    pub fn is_visible_user(&self) -> bool {
        self.role == MessageRole::User && !self.is_hidden
    }
}

/// Chat session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            last_message_at: now,
            messages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of real user messages sent so far
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_visible_user()).count()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Recompute the title from the first real user message
    pub fn refresh_title(&mut self) {
        if let Some(first) = self.messages.iter().find(|m| m.is_visible_user()) {
            self.title = generate_title(&first.content);
        }
    }

    /// Short preview of the most recent visible message
    pub fn last_message_preview(&self) -> String {
        let Some(last) = self.messages.iter().rev().find(|m| !m.is_hidden) else {
            return "No messages yet".to_string();
        };

        let preview = last.content.trim();
        if preview.chars().count() <= MAX_PREVIEW_CHARS {
            preview.to_string()
        } else {
            let cut: String = preview.chars().take(MAX_PREVIEW_CHARS).collect();
            format!("{cut}...")
        }
    }

    /// Copy of the session without the given message, for persisting while a
    /// response is still streaming into it
    pub fn without_message(&self, id: &str) -> Self {
        Self {
            messages: self
                .messages
                .iter()
                .filter(|m| m.id != id)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }
}

/// Derive a title from a message: the first line, cut at a word boundary to
/// at most 50 characters plus an ellipsis.
pub fn generate_title(message: &str) -> String {
    let cleaned = message.trim();
    if cleaned.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    let first_line = cleaned.lines().next().unwrap_or(cleaned).trim();
    if first_line.chars().count() <= MAX_TITLE_CHARS {
        return first_line.to_string();
    }

    let truncated: String = first_line.chars().take(MAX_TITLE_CHARS).collect();
    match truncated.rsplit_once(' ') {
        Some((head, _)) => format!("{}...", head.trim_end()),
        None => format!("{truncated}..."),
    }
}

/// Session summary for list views
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub preview: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            last_message_at: session.last_message_at,
            preview: session.last_message_preview(),
        }
    }
}
