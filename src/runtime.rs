//! Runtime for executing conversations
//!
//! One `ConversationRuntime` task per open session serializes every event for
//! that session. `RuntimeManager` starts them on demand and routes events.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ConversationRuntime;
pub use traits::*;

use crate::db::{Message, Session, SessionSummary};
use crate::pacing::TimerSnapshot;
use crate::state_machine::{EngineEvent, Event, StateView};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors from routing work to session runtimes
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Session runtime has stopped: {0}")]
    Stopped(String),
}

/// Current session plus engine view, for pull-based readers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: Session,
    pub state: StateView,
}

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        snapshot: SessionSnapshot,
    },
    MessageAppended {
        message: Message,
    },
    Fragment {
        message_id: String,
        text: String,
    },
    MessageFinalized {
        message: Message,
    },
    MessagesRemoved {
        ids: Vec<String>,
    },
    TitleChanged {
        title: String,
    },
    StateChange {
        state: StateView,
    },
    Notice {
        event: EngineEvent,
    },
    Timer {
        timer: TimerSnapshot,
    },
    Error {
        message: String,
    },
}

/// Handle to interact with a running conversation
#[derive(Clone)]
pub struct ConversationHandle {
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_tx: broadcast::Sender<SseEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
}

/// A started runtime and the task driving it
struct RunningSession {
    handle: ConversationHandle,
    task: JoinHandle<()>,
}

/// Manager for all conversation runtimes
pub struct RuntimeManager<S = DatabaseStorage, C = ServiceCompletionClient>
where
    S: SessionStore + Clone + 'static,
    C: CompletionClient + 'static,
{
    storage: S,
    client: Arc<C>,
    runtimes: RwLock<HashMap<String, RunningSession>>,
}

impl<S, C> RuntimeManager<S, C>
where
    S: SessionStore + Clone + 'static,
    C: CompletionClient + 'static,
{
    pub fn new(storage: S, client: Arc<C>) -> Self {
        Self {
            storage,
            client,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    /// Start a runtime for a fresh session. Nothing is stored until the first
    /// message is sent.
    pub async fn create_session(&self) -> SessionSnapshot {
        let session = Session::new();
        let handle = self.start(session).await;
        let snapshot = handle.snapshot_rx.borrow().clone();
        tracing::info!(session_id = %snapshot.session.id, "Created session");
        snapshot
    }

    /// Get or create a runtime for a stored session
    pub async fn get_or_create(
        &self,
        session_id: &str,
    ) -> Result<ConversationHandle, RuntimeError> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(running) = runtimes.get(session_id) {
                return Ok(running.handle.clone());
            }
        }

        let session = self
            .storage
            .get(session_id)
            .await
            .map_err(RuntimeError::Storage)?
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_string()))?;
        Ok(self.start(session).await)
    }

    async fn start(&self, session: Session) -> ConversationHandle {
        let mut runtimes = self.runtimes.write().await;
        // Lost a race with another loader
        if let Some(running) = runtimes.get(&session.id) {
            return running.handle.clone();
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (broadcast_tx, _) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            state: crate::state_machine::EngineState::default()
                .view(&session, chrono::Utc::now()),
            session: session.clone(),
        });
        let shutdown = CancellationToken::new();

        let session_id = session.id.clone();
        let runtime = ConversationRuntime::new(
            session,
            self.storage.clone(),
            Arc::clone(&self.client),
            event_rx,
            event_tx.clone(),
            broadcast_tx.clone(),
            snapshot_tx,
            shutdown.clone(),
        );

        // Start runtime in background
        let id = session_id.clone();
        let task = tokio::spawn(async move {
            runtime.run().await;
            tracing::info!(session_id = %id, "Conversation runtime finished");
        });

        let handle = ConversationHandle {
            event_tx,
            broadcast_tx,
            snapshot_rx,
            shutdown,
        };
        runtimes.insert(
            session_id,
            RunningSession {
                handle: handle.clone(),
                task,
            },
        );
        handle
    }

    /// Send an event to a session
    pub async fn send_event(&self, session_id: &str, event: Event) -> Result<(), RuntimeError> {
        let handle = self.get_or_create(session_id).await?;
        handle
            .event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::Stopped(session_id.to_string()))
    }

    /// Subscribe to session updates, with the snapshot they start from
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SseEvent>), RuntimeError> {
        let handle = self.get_or_create(session_id).await?;
        // Subscribe first so nothing published after the snapshot is missed
        let rx = handle.broadcast_tx.subscribe();
        let snapshot = handle.snapshot_rx.borrow().clone();
        Ok((snapshot, rx))
    }

    /// Current state of a session
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, RuntimeError> {
        let handle = self.get_or_create(session_id).await?;
        let snapshot = handle.snapshot_rx.borrow().clone();
        Ok(snapshot)
    }

    /// Stored sessions, most recent activity first
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, RuntimeError> {
        let sessions = self.storage.load_all().await.map_err(RuntimeError::Storage)?;
        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Stop the session's runtime and remove it from storage.
    ///
    /// The runtime task has finished before storage is touched, and the
    /// registry stays locked until the delete is done.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), RuntimeError> {
        let mut runtimes = self.runtimes.write().await;
        if let Some(running) = runtimes.remove(session_id) {
            running.handle.shutdown.cancel();
            if let Err(e) = running.task.await {
                tracing::warn!(session_id = %session_id, error = %e, "Conversation runtime ended abnormally");
            }
        }
        self.storage
            .delete(session_id)
            .await
            .map_err(RuntimeError::Storage)?;
        tracing::info!(session_id = %session_id, "Deleted session");
        Ok(())
    }
}
