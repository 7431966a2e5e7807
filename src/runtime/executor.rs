//! Conversation runtime executor

use super::traits::{CompletionClient, SessionStore};
use super::{SessionSnapshot, SseEvent};

use crate::db::Session;
use crate::llm::{LlmMessage, LlmRequest};
use crate::state_machine::{
    transition, CompletionPlan, Effect, EngineEvent, EngineState, Event, TransitionError,
};
use crate::system_prompt::compose;
use crate::title_generator::generate_title;
use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Period of the pacing timer tick
const TIMER_TICK: Duration = Duration::from_secs(1);

/// Runs one session: applies events in order, executes their effects and
/// reports every change to observers
pub struct ConversationRuntime<S, C>
where
    S: SessionStore + Clone + 'static,
    C: CompletionClient + 'static,
{
    session: Session,
    state: EngineState,
    storage: S,
    client: Arc<C>,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SseEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Token to cancel the streaming completion
    stream_cancel: Option<CancellationToken>,
    /// Stops the runtime when the session is deleted
    shutdown: CancellationToken,
}

impl<S, C> ConversationRuntime<S, C>
where
    S: SessionStore + Clone + 'static,
    C: CompletionClient + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Session,
        storage: S,
        client: Arc<C>,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SseEvent>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            state: EngineState::default(),
            storage,
            client,
            event_rx,
            event_tx,
            broadcast_tx,
            snapshot_tx,
            stream_cancel: None,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.session.id,
            model = %self.client.model_id(),
            "Starting conversation runtime"
        );
        self.publish_snapshot();

        let mut ticker = tokio::time::interval(TIMER_TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Process events in a loop - no recursion
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                Some(event) = self.event_rx.recv() => {
                    if let Err(e) = self.process_event(event).await {
                        tracing::warn!(session_id = %self.session.id, error = %e, "Event rejected");
                        let _ = self.broadcast_tx.send(SseEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
                _ = ticker.tick() => {
                    if self.state.timer.is_active() {
                        let _ = self.process_event(Event::TimerTick { at: Utc::now() }).await;
                    }
                }
                else => break,
            }
        }

        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }
        tracing::info!(session_id = %self.session.id, "Conversation runtime stopped");
    }

    async fn process_event(&mut self, event: Event) -> Result<(), TransitionError> {
        let noisy = event.is_noisy();
        if !noisy {
            tracing::debug!(session_id = %self.session.id, ?event, "Processing event");
        }
        let is_tick = matches!(event, Event::TimerTick { .. });

        // Pure state transition
        let result = transition(&self.state, &self.session, event)?;
        self.state = result.new_state;

        // Effects run in order, each seeing the session as left by the previous one
        for effect in result.effects {
            self.execute_effect(effect).await;
        }

        // Readers woken by the broadcast must see the new snapshot
        self.publish_snapshot();
        let now = Utc::now();
        if !noisy {
            let _ = self.broadcast_tx.send(SseEvent::StateChange {
                state: self.state.view(&self.session, now),
            });
        } else if is_tick {
            let _ = self.broadcast_tx.send(SseEvent::Timer {
                timer: self.state.timer.snapshot(now),
            });
        }
        Ok(())
    }

    fn publish_snapshot(&self) {
        let snapshot = SessionSnapshot {
            session: self.session.clone(),
            state: self.state.view(&self.session, Utc::now()),
        };
        self.snapshot_tx.send_replace(snapshot);
    }

    /// Execute an effect: session edits first, then outside-world work
    async fn execute_effect(&mut self, effect: Effect) {
        if effect.apply(&mut self.session) {
            self.broadcast_session_edit(&effect);
            return;
        }

        match effect {
            Effect::PersistSession => self.persist().await,

            Effect::RequestCompletion(plan) => self.request_completion(plan),

            Effect::AbortCompletion => {
                // Fragments already queued for the old request are ignored by id
                tracing::info!(session_id = %self.session.id, "Cancelling completion");
                if let Some(token) = self.stream_cancel.take() {
                    token.cancel();
                }
            }

            Effect::GenerateTitle { text } => {
                let client = Arc::clone(&self.client);
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    if let Some(title) = generate_title(&text, client.as_ref()).await {
                        let _ = event_tx.send(Event::TitleGenerated { title }).await;
                    }
                });
            }

            Effect::ScheduleQuizAdvance { delay } => {
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = event_tx.send(Event::QuizAdvance).await;
                });
            }

            Effect::Notify(event) => {
                self.log_notice(&event);
                let _ = self.broadcast_tx.send(SseEvent::Notice { event });
            }

            // Applied to the session above
            Effect::AppendMessage(_)
            | Effect::AppendFragment { .. }
            | Effect::FinalizeMessage { .. }
            | Effect::RemoveMessages { .. }
            | Effect::SetTitle { .. } => {}
        }
    }

    fn broadcast_session_edit(&self, effect: &Effect) {
        let event = match effect {
            Effect::AppendMessage(message) => SseEvent::MessageAppended {
                message: message.clone(),
            },
            Effect::AppendFragment { message_id, text } => SseEvent::Fragment {
                message_id: message_id.clone(),
                text: text.clone(),
            },
            Effect::FinalizeMessage { message_id, .. } => {
                let Some(message) = self.session.message(message_id) else {
                    return;
                };
                SseEvent::MessageFinalized {
                    message: message.clone(),
                }
            }
            Effect::RemoveMessages { ids } => SseEvent::MessagesRemoved { ids: ids.clone() },
            Effect::SetTitle { title } => SseEvent::TitleChanged {
                title: title.clone(),
            },
            _ => return,
        };
        let _ = self.broadcast_tx.send(event);
    }

    fn log_notice(&self, event: &EngineEvent) {
        let session_id = &self.session.id;
        match event {
            EngineEvent::QuizRetrying { attempt, reason } => {
                tracing::warn!(%session_id, attempt, %reason, "Malformed quiz reply, retrying");
            }
            EngineEvent::QuizFailed { .. } => {
                tracing::error!(%session_id, "Quiz retries exhausted");
            }
            EngineEvent::Error(notice) => {
                tracing::warn!(%session_id, ?notice, "Completion failed");
            }
            EngineEvent::QuizTypeRequested { .. }
            | EngineEvent::QuizCompleted { .. }
            | EngineEvent::TimerExpired => {
                tracing::info!(%session_id, ?event, "Engine notice");
            }
        }
    }

    /// Save the session, leaving out the message still being streamed into
    async fn persist(&self) {
        let snapshot = match self.state.in_flight() {
            Some(in_flight) => self.session.without_message(&in_flight.placeholder_id),
            None => self.session.clone(),
        };
        // Unsaved until the first message is sent
        if snapshot.is_empty() {
            return;
        }

        if let Err(e) = self.storage.save(&snapshot).await {
            tracing::error!(session_id = %self.session.id, error = %e, "Failed to persist session");
            let _ = self.broadcast_tx.send(SseEvent::Error {
                message: format!("Failed to save session: {e}"),
            });
        }
    }

    fn request_completion(&mut self, plan: CompletionPlan) {
        let CompletionPlan {
            request_id,
            placeholder_id,
            mut prompt,
        } = plan;

        prompt.pacing = self.state.timer.pacing_description(Utc::now());
        let request = LlmRequest {
            system: compose(&prompt),
            messages: completion_history(&self.session, &placeholder_id),
            max_tokens: None,
        };

        // A stale stream must never deliver into the new placeholder
        let cancel = CancellationToken::new();
        if let Some(previous) = self.stream_cancel.replace(cancel.clone()) {
            previous.cancel();
        }

        let client = Arc::clone(&self.client);
        let event_tx = self.event_tx.clone();
        tracing::info!(
            session_id = %self.session.id,
            request_id,
            mode = prompt.mode.as_str(),
            history = request.messages.len(),
            "Requesting completion"
        );
        tokio::spawn(stream_completion(client, request, request_id, cancel, event_tx));
    }
}

/// Conversation history for a request: every message before the placeholder.
/// Quiz replies whose visible text was cleared are sent as a readable rendering
/// of their record.
pub(crate) fn completion_history(session: &Session, placeholder_id: &str) -> Vec<LlmMessage> {
    session
        .messages
        .iter()
        .take_while(|m| m.id != placeholder_id)
        .filter_map(|m| {
            let text = match &m.quiz {
                Some(record) if m.content.is_empty() => record.context_text(),
                _ => m.content.clone(),
            };
            if text.trim().is_empty() {
                return None;
            }
            Some(LlmMessage { role: m.role, text })
        })
        .collect()
}

/// Drive one streaming completion, forwarding fragments in order as events
async fn stream_completion<C>(
    client: Arc<C>,
    request: LlmRequest,
    request_id: u64,
    cancel: CancellationToken,
    event_tx: mpsc::Sender<Event>,
) where
    C: CompletionClient + ?Sized,
{
    let start = Instant::now();

    let mut stream = tokio::select! {
        biased;

        () = cancel.cancelled() => {
            tracing::info!(request_id, "Completion cancelled before streaming");
            return;
        }

        result = client.stream(&request, cancel.clone()) => match result {
            Ok(stream) => stream,
            Err(error) => {
                let _ = event_tx.send(Event::StreamFailed { request_id, error }).await;
                return;
            }
        },
    };

    let mut full_text = String::new();
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::info!(request_id, chars = full_text.len(), "Completion cancelled mid-stream");
                return;
            }

            item = stream.next() => match item {
                Some(Ok(text)) => {
                    full_text.push_str(&text);
                    if event_tx.send(Event::StreamChunk { request_id, text }).await.is_err() {
                        return;
                    }
                }
                Some(Err(error)) => {
                    let _ = event_tx.send(Event::StreamFailed { request_id, error }).await;
                    return;
                }
                None => break,
            },
        }
    }

    tracing::debug!(
        request_id,
        chars = full_text.len(),
        duration_ms = %start.elapsed().as_millis(),
        "Completion streamed"
    );
    let _ = event_tx
        .send(Event::StreamComplete {
            request_id,
            full_text,
        })
        .await;
}
