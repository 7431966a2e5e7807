//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{Database, DbError, Session};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, TextStream};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Durable storage for sessions and their messages
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions, most recent activity first
    async fn load_all(&self) -> Result<Vec<Session>, String>;

    async fn get(&self, session_id: &str) -> Result<Option<Session>, String>;

    /// Insert or replace the session and its full message list
    async fn save(&self, session: &Session) -> Result<(), String>;

    async fn delete(&self, session_id: &str) -> Result<(), String>;
}

/// Client for the completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a cancelable stream of text fragments
    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError>;

    /// One-shot completion, used for title generation
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn load_all(&self) -> Result<Vec<Session>, String> {
        (**self).load_all().await
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, String> {
        (**self).get(session_id).await
    }

    async fn save(&self, session: &Session) -> Result<(), String> {
        (**self).save(session).await
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        (**self).delete(session_id).await
    }
}

#[async_trait]
impl<T: CompletionClient + ?Sized> CompletionClient for Arc<T> {
    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError> {
        (**self).stream(request, cancel).await
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        (**self).complete(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `SessionStore`
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn load_all(&self) -> Result<Vec<Session>, String> {
        self.db.list_sessions().map_err(|e| e.to_string())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, String> {
        match self.db.get_session(session_id) {
            Ok(session) => Ok(Some(session)),
            Err(DbError::SessionNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), String> {
        self.db.save_session(session).map_err(|e| e.to_string())
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        self.db.delete_session(session_id).map_err(|e| e.to_string())
    }
}

/// Adapter to use an `LlmService` as `CompletionClient`
#[derive(Clone)]
pub struct ServiceCompletionClient {
    service: Arc<dyn LlmService>,
}

impl ServiceCompletionClient {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CompletionClient for ServiceCompletionClient {
    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError> {
        self.service.stream(request, cancel).await
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.service.complete(request).await
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}
