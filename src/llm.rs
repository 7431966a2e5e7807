//! Completion service abstraction
//!
//! Provides a common interface for streaming and one-shot completions.

mod anthropic;
mod config;
mod error;
mod sse;
mod types;

pub use anthropic::AnthropicService;
pub use config::LlmConfig;
pub use error::{LlmError, LlmErrorKind};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Common interface for completion providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a single, non-streaming completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Open a streaming completion. Fragments stop once `cancel` fires.
    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for completion services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Completion finished"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    transient = e.is_transient(),
                    "Completion failed"
                );
            }
        }

        result
    }

    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError> {
        let start = Instant::now();
        let model_id = self.model_id.clone();
        let inner = match self.inner.stream(request, cancel).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %model_id,
                    error = %e.message,
                    kind = ?e.kind,
                    "Stream failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %model_id,
            messages = request.messages.len(),
            open_ms = %start.elapsed().as_millis(),
            "Stream opened"
        );

        let mut fragments = 0usize;
        let logged = inner.inspect(move |item| match item {
            Ok(_) => fragments += 1,
            Err(e) => tracing::warn!(
                model = %model_id,
                fragments,
                error = %e.message,
                "Stream broke mid-response"
            ),
        });
        Ok(Box::pin(logged))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
