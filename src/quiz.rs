//! Quiz protocol
//!
//! In quiz mode the model answers with one structured JSON record per turn.
//! This module finds that record in the reply, checks it against the record
//! contract, and builds escalating corrections when it is malformed.

mod parse;
mod record;
mod retry;


pub use parse::parse_record;
pub use record::{
    CompletionRecord, FeedbackRecord, QuestionRecord, QuizRecord, QuizType, COMPLETE_EXAMPLE,
    FEEDBACK_EXAMPLE,
};
pub use retry::{RetryDecision, RetryTracker, EXHAUSTED_MESSAGE};

#[cfg(test)]
pub use parse::extract_reply;
#[cfg(test)]
pub use record::{RawQuizReply, QuizViolation};
#[cfg(test)]
pub use retry::MAX_QUIZ_ATTEMPTS;
