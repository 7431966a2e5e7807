//! Quiz wire records and their validation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Quiz flavour chosen by the user when a quiz starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    MultipleChoice,
    ExtendedResponse,
}

impl QuizType {
    pub const ALL: [QuizType; 2] = [QuizType::MultipleChoice, QuizType::ExtendedResponse];

    /// Wire spelling used in `questionType`
    pub fn as_str(self) -> &'static str {
        match self {
            QuizType::MultipleChoice => "multiple_choice",
            QuizType::ExtendedResponse => "extended_response",
        }
    }

    /// Minimal valid `question` record for this quiz type
    pub fn example_question(self) -> &'static str {
        match self {
            QuizType::MultipleChoice => MULTIPLE_CHOICE_EXAMPLE,
            QuizType::ExtendedResponse => EXTENDED_RESPONSE_EXAMPLE,
        }
    }
}

const MULTIPLE_CHOICE_EXAMPLE: &str = r#"{"type": "question", "number": 1, "total": 5, "preamble": "Let's start with the basics.", "questionText": "Which force keeps planets in orbit around the Sun?", "questionType": "multiple_choice", "options": ["A) Magnetism", "B) Gravity", "C) Friction", "D) Tension"], "correctAnswer": "B"}"#;

const EXTENDED_RESPONSE_EXAMPLE: &str = r#"{"type": "question", "number": 1, "total": 5, "preamble": "Let's start with the basics.", "questionText": "Explain why planets stay in orbit instead of flying off into space.", "hint": "Think about the balance between motion and attraction.", "questionType": "extended_response"}"#;

pub const FEEDBACK_EXAMPLE: &str = r#"{"type": "feedback", "isCorrect": true, "userAnswer": "B", "explanation": "Gravity provides the centripetal force that bends each planet's path.", "encouragement": "Great start!"}"#;

pub const COMPLETE_EXAMPLE: &str = r#"{"type": "quiz_complete", "score": "4/5", "percentage": 80, "summary": "Solid understanding overall.", "strengths": ["Orbital mechanics"], "weaknesses": ["Escape velocity"], "improvementPlan": "Review how speed changes an orbit's shape.", "closingMessage": "Nice work!"}"#;

/// Reply as it arrives from the model: every field optional, unknown fields ignored
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuizReply {
    #[serde(rename = "type")]
    pub kind: String,
    pub topic: Option<String>,
    pub number: Option<u32>,
    pub total: Option<u32>,
    pub preamble: Option<String>,
    pub question_text: Option<String>,
    pub hint: Option<String>,
    pub question_type: Option<String>,
    pub options: Option<Vec<String>>,
    pub correct_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub user_answer: Option<String>,
    pub explanation: Option<String>,
    pub encouragement: Option<String>,
    pub score: Option<String>,
    pub percentage: Option<i64>,
    pub summary: Option<String>,
    pub strengths: Option<Vec<String>>,
    pub weaknesses: Option<Vec<String>>,
    pub improvement_plan: Option<String>,
    pub closing_message: Option<String>,
}

/// A validated quiz record, attached to the assistant message it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuizRecord {
    QuizStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
    },
    Question(QuestionRecord),
    Feedback(FeedbackRecord),
    QuizComplete(CompletionRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub number: u32,
    pub total: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub question_type: QuizType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<String>,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encouragement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub score: String,
    pub percentage: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvement_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_message: Option<String>,
}

/// Why a reply was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuizViolation {
    #[error("the reply did not contain a JSON object with a \"type\" field")]
    NoJson,
    #[error("field \"{field}\" has the wrong type ({detail})")]
    WrongFieldType { field: String, detail: String },
    #[error("unknown record type \"{0}\" (expected question, feedback, quiz_complete or quiz_start)")]
    UnknownType(String),
    #[error("a {record} record requires the \"{field}\" field")]
    MissingField {
        record: &'static str,
        field: &'static str,
    },
    #[error("questionType must be \"{expected}\" for this quiz, got \"{found}\"")]
    QuestionTypeMismatch { expected: &'static str, found: String },
    #[error("multiple choice questions need exactly 4 options, got {0}")]
    OptionCount(usize),
    #[error("correctAnswer must be a single letter A-D, got \"{0}\"")]
    BadCorrectAnswer(String),
    #[error("extended response questions must not include options or correctAnswer")]
    UnexpectedChoices,
    #[error("score must look like \"X/Y\", got \"{0}\"")]
    BadScore(String),
    #[error("percentage must be an integer from 0 to 100, got {0}")]
    PercentageOutOfRange(i64),
    #[error("\"{0}\" must be a non-empty list")]
    EmptyList(&'static str),
}

const MULTIPLE_CHOICE_OPTIONS: usize = 4;

static SCORE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\s*/\s*\d+\s*$").expect("valid score pattern")
});

fn required<T>(value: Option<T>, record: &'static str, field: &'static str) -> Result<T, QuizViolation> {
    value.ok_or(QuizViolation::MissingField { record, field })
}

fn required_text(
    value: Option<String>,
    record: &'static str,
    field: &'static str,
) -> Result<String, QuizViolation> {
    required(value.filter(|v| !v.trim().is_empty()), record, field)
}

impl RawQuizReply {
    /// Check the record contract for this reply's kind
    pub fn validate(self, quiz_type: QuizType) -> Result<QuizRecord, QuizViolation> {
        match self.kind.as_str() {
            "quiz_start" => Ok(QuizRecord::QuizStart { topic: self.topic }),
            "question" => self.validate_question(quiz_type).map(QuizRecord::Question),
            "feedback" => self.validate_feedback().map(QuizRecord::Feedback),
            "quiz_complete" => self.validate_completion().map(QuizRecord::QuizComplete),
            other => Err(QuizViolation::UnknownType(other.to_string())),
        }
    }

    fn validate_question(self, quiz_type: QuizType) -> Result<QuestionRecord, QuizViolation> {
        const RECORD: &str = "question";
        let number = required(self.number, RECORD, "number")?;
        let total = required(self.total, RECORD, "total")?;
        let question_text = required_text(self.question_text, RECORD, "questionText")?;
        let found = required(self.question_type, RECORD, "questionType")?;
        if found != quiz_type.as_str() {
            return Err(QuizViolation::QuestionTypeMismatch {
                expected: quiz_type.as_str(),
                found,
            });
        }

        let (options, correct_answer) = match quiz_type {
            QuizType::MultipleChoice => {
                let options = required(self.options, RECORD, "options")?;
                if options.len() != MULTIPLE_CHOICE_OPTIONS {
                    return Err(QuizViolation::OptionCount(options.len()));
                }
                let answer = required(self.correct_answer, RECORD, "correctAnswer")?;
                (Some(options), Some(normalize_answer_letter(&answer)?))
            }
            QuizType::ExtendedResponse => {
                if self.options.is_some() || self.correct_answer.is_some() {
                    return Err(QuizViolation::UnexpectedChoices);
                }
                (None, None)
            }
        };

        Ok(QuestionRecord {
            number,
            total,
            preamble: self.preamble,
            question_text,
            hint: self.hint,
            question_type: quiz_type,
            options,
            correct_answer,
        })
    }

    fn validate_feedback(self) -> Result<FeedbackRecord, QuizViolation> {
        const RECORD: &str = "feedback";
        Ok(FeedbackRecord {
            is_correct: required(self.is_correct, RECORD, "isCorrect")?,
            user_answer: self.user_answer,
            explanation: required_text(self.explanation, RECORD, "explanation")?,
            encouragement: self.encouragement,
        })
    }

    fn validate_completion(self) -> Result<CompletionRecord, QuizViolation> {
        const RECORD: &str = "quiz_complete";
        let score = required(self.score, RECORD, "score")?;
        if !SCORE_PATTERN.is_match(&score) {
            return Err(QuizViolation::BadScore(score));
        }
        let percentage = required(self.percentage, RECORD, "percentage")?;
        let percentage =
            u8::try_from(percentage)
                .ok()
                .filter(|p| *p <= 100)
                .ok_or(QuizViolation::PercentageOutOfRange(percentage))?;
        let strengths = required(self.strengths, RECORD, "strengths")?;
        if strengths.is_empty() {
            return Err(QuizViolation::EmptyList("strengths"));
        }
        let weaknesses = required(self.weaknesses, RECORD, "weaknesses")?;
        if weaknesses.is_empty() {
            return Err(QuizViolation::EmptyList("weaknesses"));
        }

        Ok(CompletionRecord {
            score: score.trim().to_string(),
            percentage,
            summary: self.summary,
            strengths,
            weaknesses,
            improvement_plan: required_text(self.improvement_plan, RECORD, "improvementPlan")?,
            closing_message: self.closing_message,
        })
    }
}

fn normalize_answer_letter(answer: &str) -> Result<String, QuizViolation> {
    let trimmed = answer.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if matches!(c.to_ascii_uppercase(), 'A'..='D') => {
            Ok(c.to_ascii_uppercase().to_string())
        }
        _ => Err(QuizViolation::BadCorrectAnswer(answer.to_string())),
    }
}

impl QuizRecord {
    /// Readable rendition of the record for conversation history, used once
    /// the raw JSON has been cleared from the message
    pub fn context_text(&self) -> String {
        let parts: Vec<String> = match self {
            QuizRecord::QuizStart { topic } => {
                vec![format!("Starting a quiz on {}.", topic.as_deref().unwrap_or("the requested topic"))]
            }
            QuizRecord::Question(q) => {
                let mut parts = Vec::new();
                parts.extend(q.preamble.clone());
                parts.push(format!("Question {} of {}: {}", q.number, q.total, q.question_text));
                if let Some(options) = &q.options {
                    parts.push(options.join("\n"));
                }
                if let Some(hint) = &q.hint {
                    parts.push(format!("Hint: {hint}"));
                }
                parts
            }
            QuizRecord::Feedback(f) => {
                let verdict = if f.is_correct { "Correct." } else { "Not quite." };
                let mut parts = vec![format!("{verdict} {}", f.explanation)];
                parts.extend(f.encouragement.clone());
                parts
            }
            QuizRecord::QuizComplete(c) => {
                let mut parts = vec![format!("Quiz complete. Score: {} ({}%).", c.score, c.percentage)];
                parts.extend(c.summary.clone());
                parts.push(format!("Strengths: {}", c.strengths.join(", ")));
                parts.push(format!("Areas to improve: {}", c.weaknesses.join(", ")));
                parts.push(c.improvement_plan.clone());
                parts.extend(c.closing_message.clone());
                parts
            }
        };
        parts.join("\n\n")
    }
}
