//! Escalating correction protocol for malformed quiz replies

use super::record::{QuizType, QuizViolation, COMPLETE_EXAMPLE, FEEDBACK_EXAMPLE};
use serde::Serialize;

/// Consecutive structural failures tolerated before the exchange is abandoned
pub const MAX_QUIZ_ATTEMPTS: u32 = 5;

/// Characters of the invalid reply echoed back in a correction
const ECHO_CHARS: usize = 300;

/// Characters quoted from each earlier invalid reply in a critical correction
const HISTORY_CHARS: usize = 120;

pub const EXHAUSTED_MESSAGE: &str = "I'm having trouble formatting this quiz question. Please try continuing the quiz or exit quiz mode and start again.";

const COMMON_MISTAKES: &[&str] = &[
    "Do not write any text before or after the JSON object.",
    "Do not wrap the JSON in markdown code fences.",
    "Use the exact field names shown, in camelCase (questionText, questionType, correctAnswer, isCorrect).",
    "Every required field must be present, even when it feels redundant.",
    "Use double quotes for every key and string value; no trailing commas.",
    "For multiple choice, give exactly 4 options and a single correctAnswer letter (A, B, C or D).",
];

/// What to do after a failed parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Ask again with a correction prompt
    Retry { attempt: u32, prompt: String },
    /// Give up on this exchange
    Exhausted,
}

/// Consecutive failure bookkeeping for the current quiz exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryTracker {
    attempts: u32,
    /// Every invalid reply of this exchange, oldest first
    invalid_replies: Vec<String>,
}

impl RetryTracker {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.invalid_replies.clear();
    }

    /// Record a failure and decide between another correction and giving up.
    /// Giving up resets the counter.
    pub fn record_failure(
        &mut self,
        reply: &str,
        violation: &QuizViolation,
        quiz_type: QuizType,
    ) -> RetryDecision {
        self.attempts += 1;
        self.invalid_replies.push(reply.to_string());

        if self.attempts >= MAX_QUIZ_ATTEMPTS {
            self.reset();
            return RetryDecision::Exhausted;
        }

        RetryDecision::Retry {
            attempt: self.attempts,
            prompt: correction_prompt(self.attempts, violation, &self.invalid_replies, quiz_type),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Correction instruction for the given attempt; severity grows with the attempt.
///
/// `replies` holds the invalid replies of the exchange, the one being
/// corrected last. From the third attempt on the earlier ones are quoted too.
fn correction_prompt(
    attempt: u32,
    violation: &QuizViolation,
    replies: &[String],
    quiz_type: QuizType,
) -> String {
    let (reply, earlier) = match replies.split_last() {
        Some((last, earlier)) => (last.as_str(), earlier),
        None => ("", replies),
    };
    let is_last = attempt + 1 >= MAX_QUIZ_ATTEMPTS;
    let mut sections = Vec::new();

    sections.push(match attempt {
        1 => "Quick reminder: your last reply could not be read as a quiz record. Please reply again using only the JSON format.".to_string(),
        2 => "Your last reply still could not be read as a quiz record. Please follow the JSON format exactly.".to_string(),
        _ => format!(
            "CRITICAL: quiz reply attempt {attempt} of {} failed. Your reply MUST be a single valid JSON object and nothing else.",
            MAX_QUIZ_ATTEMPTS - 1
        ),
    });
    if is_last {
        sections.push(
            "This is your LAST CHANCE. If this reply is not valid JSON the question will be abandoned."
                .to_string(),
        );
    }

    sections.push(format!("Likely problem: {violation}."));

    if attempt >= 2 {
        sections.push(format!(
            "Your invalid reply was:\n{}",
            truncate(reply.trim(), ECHO_CHARS)
        ));
    }

    if attempt >= 3 && !earlier.is_empty() {
        let history = earlier
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, truncate(r.trim(), HISTORY_CHARS)))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!(
            "Your earlier invalid replies were:\n{history}\nDo not repeat any of them."
        ));
    }

    let shown = match attempt {
        1 => 2,
        2 => 4,
        _ => COMMON_MISTAKES.len(),
    };
    let mistakes = COMMON_MISTAKES
        .iter()
        .take(shown)
        .map(|m| format!("- {m}"))
        .collect::<Vec<_>>()
        .join("\n");
    sections.push(format!("Common mistakes to avoid:\n{mistakes}"));

    sections.push(format!(
        "A valid {} question looks like:\n{}\n\nFeedback looks like:\n{FEEDBACK_EXAMPLE}\n\nThe final summary looks like:\n{COMPLETE_EXAMPLE}",
        quiz_type.as_str(),
        quiz_type.example_question()
    ));

    sections.join("\n\n")
}
