//! Completion service failures
//!
//! Failures are sorted into the kinds the user-facing error notices are built
//! from. Generic HTTP status classification lives here; clients only pull
//! the service's own message out of the response body.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A failed completion call
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    /// Wait requested by the service before the next attempt
    pub retry_after: Option<Duration>,
}

/// How a completion call failed, as far as the user is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// No answer from the service: connection refused, DNS, timeout
    Unreachable,
    /// Missing or refused credentials
    Credentials,
    /// Too many requests
    Throttled,
    /// The service failed or is overloaded
    Service,
    /// The service refused this particular request
    Rejected,
    Unclassified,
}

impl LlmErrorKind {
    /// Sending the same request again later may succeed
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Unreachable | Self::Throttled | Self::Service)
    }
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unreachable, message)
    }

    pub fn credentials(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Credentials, message)
    }

    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Throttled, message)
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Service, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Rejected, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unclassified, message)
    }

    /// Classify a non-success HTTP status carrying the service's `message`
    pub fn from_status(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::credentials(format!("Authentication failed: {message}")),
            429 => Self::throttled(format!("Rate limited: {message}")),
            400 | 404 | 413 | 422 => Self::rejected(format!("Request rejected: {message}")),
            500..=599 => Self::service(format!("Service error: {message}")),
            _ => Self::unclassified(format!("HTTP {status}: {message}")),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}
