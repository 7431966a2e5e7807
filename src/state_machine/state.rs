//! Conversation state types

use crate::db::Session;
use crate::pacing::{PacingTimer, TimerSnapshot};
use crate::quiz::{CompletionRecord, FeedbackRecord, QuestionRecord, QuizType, RetryTracker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User messages that must pass after a frustration trigger before it re-enables
pub const FRUSTRATION_COOLDOWN_MESSAGES: usize = 3;

// ============================================================================
// Mode and lens
// ============================================================================

/// Pedagogical behaviour governing the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Standard,
    Writing,
    Debate,
    Mimic,
    Quiz,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Standard,
        Mode::Writing,
        Mode::Debate,
        Mode::Mimic,
        Mode::Quiz,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Writing => "writing",
            Mode::Debate => "debate",
            Mode::Mimic => "mimic",
            Mode::Quiz => "quiz",
        }
    }
}

/// Thematic overlay applied to standard tutoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lens {
    pub name: String,
    pub description: String,
}

impl Lens {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

// ============================================================================
// Quiz session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizQuestion {
    pub number: u32,
    pub total: u32,
    pub text: String,
    pub question_type: QuizType,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub user_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub feedback: Option<String>,
}

impl From<&QuestionRecord> for QuizQuestion {
    fn from(record: &QuestionRecord) -> Self {
        Self {
            number: record.number,
            total: record.total,
            text: record.question_text.clone(),
            question_type: record.question_type,
            options: record.options.clone(),
            correct_answer: record.correct_answer.clone(),
            user_answer: None,
            is_correct: None,
            feedback: None,
        }
    }
}

/// An active quiz; exists only while the mode is `Quiz`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizSession {
    pub topic: String,
    pub quiz_type: QuizType,
    pub questions: Vec<QuizQuestion>,
    pub current_index: usize,
    pub is_complete: bool,
    pub score: Option<String>,
    pub percentage: Option<u8>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvement_plan: Option<String>,
}

impl QuizSession {
    pub fn new(topic: impl Into<String>, quiz_type: QuizType) -> Self {
        Self {
            topic: topic.into(),
            quiz_type,
            questions: Vec::new(),
            current_index: 0,
            is_complete: false,
            score: None,
            percentage: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            improvement_plan: None,
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        self.questions.get(self.current_index)
    }

    pub fn is_awaiting_answer(&self) -> bool {
        self.current_question()
            .is_some_and(|q| q.user_answer.is_none() && q.is_correct.is_none())
    }

    pub fn add_question(&mut self, record: &QuestionRecord) {
        self.questions.push(QuizQuestion::from(record));
    }

    /// Record feedback on the current question
    pub fn record_feedback(&mut self, feedback: &FeedbackRecord, fallback_answer: Option<&str>) {
        if let Some(question) = self.questions.get_mut(self.current_index) {
            question.user_answer = feedback
                .user_answer
                .clone()
                .or_else(|| fallback_answer.map(str::to_string));
            question.is_correct = Some(feedback.is_correct);
            question.feedback = Some(feedback.explanation.clone());
        }
    }

    /// Move past the current question once it has feedback
    pub fn advance(&mut self) {
        if self.current_question().is_some_and(|q| q.is_correct.is_some()) {
            self.current_index += 1;
        }
    }

    pub fn complete(&mut self, record: &CompletionRecord) {
        self.score = Some(record.score.clone());
        self.percentage = Some(record.percentage);
        self.strengths.clone_from(&record.strengths);
        self.weaknesses.clone_from(&record.weaknesses);
        self.improvement_plan = Some(record.improvement_plan.clone());
        self.is_complete = true;
    }
}

// ============================================================================
// Request lifecycle
// ============================================================================

/// What triggered the in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    UserMessage,
    Frustration,
    QuizRetry { attempt: u32 },
    QuizContinue,
}

/// The single outstanding completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlight {
    pub request_id: u64,
    /// Assistant message receiving the streamed fragments
    pub placeholder_id: String,
    /// Hidden messages sent only to trigger this request; removed if it fails
    pub trigger_ids: Vec<String>,
    pub kind: RequestKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Streaming(InFlight),
}

/// Rate limit on the frustration trigger, counted in user messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrustrationGate {
    last_activation: Option<usize>,
}

impl FrustrationGate {
    pub fn is_available(self, user_messages: usize) -> bool {
        match self.last_activation {
            None => user_messages >= 1,
            Some(at) => user_messages >= at + FRUSTRATION_COOLDOWN_MESSAGES,
        }
    }

    pub fn record(&mut self, user_messages: usize) {
        self.last_activation = Some(user_messages);
    }
}

// ============================================================================
// Engine state
// ============================================================================

/// Everything the engine tracks beside the session's messages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub phase: Phase,
    pub mode: Mode,
    pub lens: Option<Lens>,
    /// Character played in mimic mode
    pub entity_name: Option<String>,
    /// Mode left behind mid-conversation, announced once with the next request
    pub switched_from: Option<Mode>,
    /// Topic typed in quiz mode while the quiz type is still being chosen
    pub pending_quiz_topic: Option<String>,
    pub quiz: Option<QuizSession>,
    pub quiz_retry: RetryTracker,
    pub frustration: FrustrationGate,
    pub timer: PacingTimer,
    pub next_request_id: u64,
}

impl EngineState {
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Streaming(_))
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        match &self.phase {
            Phase::Streaming(in_flight) => Some(in_flight),
            Phase::Idle => None,
        }
    }

    /// In-flight request if `request_id` is the current one
    pub fn current_request(&self, request_id: u64) -> Option<&InFlight> {
        self.in_flight().filter(|f| f.request_id == request_id)
    }

    /// The quiz whose replies must be parsed, if any
    pub fn active_quiz(&self) -> Option<&QuizSession> {
        self.quiz.as_ref().filter(|_| self.mode == Mode::Quiz)
    }

    /// Serializable view for observers
    pub fn view(&self, session: &Session, now: DateTime<Utc>) -> StateView {
        StateView {
            phase: self.phase.clone(),
            mode: self.mode,
            lens: self.lens.clone(),
            entity_name: self.entity_name.clone(),
            pending_quiz_topic: self.pending_quiz_topic.clone(),
            quiz: self.quiz.clone(),
            quiz_retry_attempts: self.quiz_retry.attempts(),
            frustration_available: !self.is_busy()
                && self.frustration.is_available(session.user_message_count()),
            timer: self.timer.snapshot(now),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub phase: Phase,
    pub mode: Mode,
    pub lens: Option<Lens>,
    pub entity_name: Option<String>,
    pub pending_quiz_topic: Option<String>,
    pub quiz: Option<QuizSession>,
    pub quiz_retry_attempts: u32,
    pub frustration_available: bool,
    pub timer: TimerSnapshot,
}
