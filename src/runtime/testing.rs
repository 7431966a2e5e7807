//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::*;
use crate::db::Session;
use crate::llm::{LlmError, LlmRequest, LlmResponse, TextStream, Usage};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock Completion Client
// ============================================================================

enum ScriptedStream {
    /// Items delivered in order; an `Err` item breaks the stream mid-response
    Items(Vec<Result<String, LlmError>>),
    /// The stream fails to open
    OpenError(LlmError),
}

/// Mock completion client that replays queued streams and completions
pub struct MockCompletionClient {
    streams: Mutex<VecDeque<ScriptedStream>>,
    completions: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    fragment_delay: Option<Duration>,
    /// Record of all stream requests made
    pub stream_requests: Mutex<Vec<LlmRequest>>,
    /// Record of all one-shot requests made
    pub completion_requests: Mutex<Vec<LlmRequest>>,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            fragment_delay: None,
            stream_requests: Mutex::new(Vec::new()),
            completion_requests: Mutex::new(Vec::new()),
        }
    }

    /// Pause before every fragment (for cancellation testing)
    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    /// Queue a stream that delivers these fragments and ends normally
    pub fn queue_stream<I, T>(&self, fragments: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let items = fragments.into_iter().map(|f| Ok(f.into())).collect();
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Items(items));
    }

    /// Queue a stream that delivers these fragments, then fails
    pub fn queue_broken_stream<I, T>(&self, fragments: I, error: LlmError)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut items: Vec<_> = fragments.into_iter().map(|f| Ok(f.into())).collect();
        items.push(Err(error));
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::Items(items));
    }

    /// Queue a stream that fails to open
    pub fn queue_open_error(&self, error: LlmError) {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream::OpenError(error));
    }

    pub fn queue_completion(&self, text: impl Into<String>) {
        self.completions.lock().unwrap().push_back(Ok(LlmResponse {
            text: text.into(),
            usage: Usage::default(),
        }));
    }

    pub fn queue_completion_error(&self, error: LlmError) {
        self.completions.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_stream_requests(&self) -> Vec<LlmRequest> {
        self.stream_requests.lock().unwrap().clone()
    }

    pub fn recorded_completion_requests(&self) -> Vec<LlmRequest> {
        self.completion_requests.lock().unwrap().clone()
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError> {
        self.stream_requests.lock().unwrap().push(request.clone());
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedStream::OpenError(LlmError::unreachable("No mock stream queued")));

        let items = match script {
            ScriptedStream::Items(items) => items,
            ScriptedStream::OpenError(error) => return Err(error),
        };

        let delay = self.fragment_delay;
        let stream = futures::stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .take_until(cancel.cancelled_owned());
        Ok(Box::pin(stream))
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.completion_requests.lock().unwrap().push(request.clone());
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unreachable("No mock completion queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory session store that also keeps every saved version
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    history: Mutex<Vec<Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Seed a stored session
    pub fn insert(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    /// Every version ever saved, oldest first
    pub fn save_history(&self) -> Vec<Session> {
        self.history.lock().unwrap().clone()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load_all(&self) -> Result<Vec<Session>, String> {
        let mut sessions: Vec<Session> = self.sessions.lock().unwrap().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(sessions)
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>, String> {
        Ok(self.session(session_id))
    }

    async fn save(&self, session: &Session) -> Result<(), String> {
        self.history.lock().unwrap().push(session.clone());
        self.insert(session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<(), String> {
        self.sessions.lock().unwrap().remove(session_id);
        Ok(())
    }
}

// ============================================================================
// Test Runtime Builder
// ============================================================================

use crate::runtime::{ConversationRuntime, SessionSnapshot, SseEvent};
use crate::state_machine::state::Phase;
use crate::state_machine::{EngineEvent, EngineState, Event};
use tokio::sync::{broadcast, mpsc, watch};

/// Helper for building test runtimes with minimal boilerplate
pub struct TestRuntime {
    pub storage: Arc<InMemorySessionStore>,
    pub client: Arc<MockCompletionClient>,
    pub event_tx: mpsc::Sender<Event>,
    pub broadcast_rx: broadcast::Receiver<SseEvent>,
    pub snapshot_rx: watch::Receiver<SessionSnapshot>,
    pub session_id: String,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    /// Create a test runtime with instant mocks
    pub fn new() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }
}

pub struct TestRuntimeBuilder {
    client: Option<MockCompletionClient>,
    session: Option<Session>,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            client: None,
            session: None,
        }
    }

    pub fn client(mut self, client: MockCompletionClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> TestRuntime {
        let storage = Arc::new(InMemorySessionStore::new());
        let client = Arc::new(self.client.unwrap_or_default());
        let session = self.session.unwrap_or_default();
        let session_id = session.id.clone();

        let (event_tx, event_rx) = mpsc::channel(64);
        let (broadcast_tx, broadcast_rx) = broadcast::channel(1024);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            state: EngineState::default().view(&session, chrono::Utc::now()),
            session: session.clone(),
        });

        let runtime = ConversationRuntime::new(
            session,
            storage.clone(),
            client.clone(),
            event_rx,
            event_tx.clone(),
            broadcast_tx,
            snapshot_tx,
            CancellationToken::new(),
        );

        let handle = tokio::spawn(async move {
            runtime.run().await;
        });

        TestRuntime {
            storage,
            client,
            event_tx,
            broadcast_rx,
            snapshot_rx,
            session_id,
            _runtime_handle: handle,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuntime {
    pub async fn send(&self, event: Event) {
        self.event_tx.send(event).await.expect("Failed to send event");
    }

    /// Send user message to the runtime
    pub async fn send_message(&self, text: &str) {
        self.send(Event::UserMessage {
            text: text.to_string(),
        })
        .await;
    }

    /// Send cancel event
    pub async fn send_cancel(&self) {
        self.send(Event::UserCancel).await;
    }

    /// Wait for the first broadcast event matching `predicate`
    pub async fn wait_for<F>(&mut self, timeout: Duration, predicate: F) -> Option<SseEvent>
    where
        F: Fn(&SseEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.broadcast_rx.recv()).await {
                Ok(Ok(event)) if predicate(&event) => return Some(event),
                _ => continue,
            }
        }
        None
    }

    /// Wait until a state change reports no request in flight
    pub async fn wait_for_idle(&mut self, timeout: Duration) -> bool {
        self.wait_for(timeout, |event| {
            matches!(event, SseEvent::StateChange { state } if state.phase == Phase::Idle)
        })
        .await
        .is_some()
    }

    /// Wait for a request to start, then for the engine to settle again.
    /// Skips idle reports left over from earlier events.
    pub async fn wait_for_reply(&mut self, timeout: Duration) -> bool {
        let started = self
            .wait_for(timeout, |event| {
                matches!(event, SseEvent::StateChange { state } if state.phase != Phase::Idle)
            })
            .await;
        started.is_some() && self.wait_for_idle(timeout).await
    }

    /// Wait for an engine notice matching `predicate`
    pub async fn wait_for_notice<F>(&mut self, timeout: Duration, predicate: F) -> Option<EngineEvent>
    where
        F: Fn(&EngineEvent) -> bool,
    {
        match self
            .wait_for(timeout, |event| {
                matches!(event, SseEvent::Notice { event } if predicate(event))
            })
            .await
        {
            Some(SseEvent::Notice { event }) => Some(event),
            _ => None,
        }
    }

    /// Latest in-memory session and engine view
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// The session as last persisted
    pub fn stored(&self) -> Option<Session> {
        self.storage.session(&self.session_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MessageRole;
    use crate::quiz::{QuizRecord, QuizType, COMPLETE_EXAMPLE, FEEDBACK_EXAMPLE};
    use crate::state_machine::state::Mode;
    use crate::state_machine::ErrorNotice;
    use chrono::{TimeDelta, Utc};

    const WAIT: Duration = Duration::from_secs(2);

    fn request(messages: Vec<crate::llm::LlmMessage>) -> LlmRequest {
        LlmRequest {
            system: "system".to_string(),
            messages,
            max_tokens: Some(100),
        }
    }

    #[tokio::test]
    async fn test_mock_client_replays_scripts() {
        let mock = MockCompletionClient::new();
        mock.queue_stream(["a", "b"]);
        mock.queue_open_error(LlmError::credentials("bad key"));

        let stream = mock.stream(&request(vec![]), CancellationToken::new()).await.unwrap();
        let fragments: Vec<String> = stream.map(Result::unwrap).collect().await;
        assert_eq!(fragments, vec!["a", "b"]);

        assert!(mock.stream(&request(vec![]), CancellationToken::new()).await.is_err());
        // Nothing left queued
        assert!(mock.stream(&request(vec![]), CancellationToken::new()).await.is_err());
        assert_eq!(mock.recorded_stream_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_stream_stops_on_cancel() {
        let mock = MockCompletionClient::new().with_fragment_delay(Duration::from_millis(20));
        mock.queue_stream(["a", "b", "c", "d"]);
        let cancel = CancellationToken::new();
        let mut stream = mock.stream(&request(vec![]), cancel.clone()).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_store_orders_by_activity() {
        let store = InMemorySessionStore::new();
        let mut older = Session::new();
        older.last_message_at = Utc::now() - TimeDelta::hours(1);
        let newer = Session::new();
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let ids: Vec<String> = store.load_all().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        assert_eq!(store.save_history().len(), 2);
    }

    /// Integration test: fragments are committed as one reply
    #[tokio::test]
    async fn test_streamed_reply_is_committed() {
        let client = MockCompletionClient::new();
        client.queue_stream(["Inertia ", "keeps things ", "moving."]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("What is inertia?").await;
        assert!(rt.wait_for_reply(WAIT).await);

        let stored = rt.stored().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[0].role, MessageRole::User);
        assert_eq!(stored.messages[1].role, MessageRole::Assistant);
        assert_eq!(stored.messages[1].content, "Inertia keeps things moving.");
        assert_eq!(stored.title, "What is inertia?");

        let requests = rt.client.recorded_stream_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].text, "What is inertia?");
    }

    /// Integration test: a placeholder is never persisted while streaming
    #[tokio::test]
    async fn test_cancel_mid_stream_persists_no_partial_content() {
        let client = MockCompletionClient::new().with_fragment_delay(Duration::from_millis(30));
        client.queue_stream(["one ", "two ", "three ", "four ", "five ", "six"]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("Count for me").await;
        assert!(rt
            .wait_for(WAIT, |e| matches!(e, SseEvent::Fragment { .. }))
            .await
            .is_some());

        rt.send_cancel().await;
        assert!(rt.wait_for_idle(WAIT).await);

        let stored = rt.stored().unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].content, "Count for me");
        assert!(rt.snapshot().session.messages.len() == 1);

        // No saved version ever held assistant content
        for saved in rt.storage.save_history() {
            assert!(saved
                .messages
                .iter()
                .all(|m| m.role == MessageRole::User || m.content.is_empty()));
        }
    }

    /// Integration test: a failed request leaves the session retryable
    #[tokio::test]
    async fn test_stream_error_removes_placeholder() {
        let client = MockCompletionClient::new();
        client.queue_open_error(LlmError::unreachable("connection refused"));

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("Hello?").await;

        let notice = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::Error(_)))
            .await
            .unwrap();
        assert!(matches!(
            notice,
            EngineEvent::Error(ErrorNotice::Connectivity { .. })
        ));
        assert!(rt.wait_for_idle(WAIT).await);

        let stored = rt.stored().unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, MessageRole::User);
        assert_eq!(rt.snapshot().session.messages.len(), 1);
    }

    /// Integration test: a stream breaking mid-response keeps no partial text
    #[tokio::test]
    async fn test_broken_stream_discards_partial_reply() {
        let client = MockCompletionClient::new();
        client.queue_broken_stream(["Half an "], LlmError::service("Overloaded"));

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("Explain entropy").await;

        let notice = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::Error(_)))
            .await
            .unwrap();
        assert_eq!(
            notice,
            EngineEvent::Error(ErrorNotice::Service {
                message: "Something went wrong: Overloaded".to_string()
            })
        );
        assert_eq!(rt.snapshot().session.messages.len(), 1);
    }

    /// Integration test: a send while streaming is rejected, not queued
    #[tokio::test]
    async fn test_send_while_streaming_is_rejected() {
        let client = MockCompletionClient::new().with_fragment_delay(Duration::from_millis(40));
        client.queue_stream(["slow ", "reply ", "here"]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("first").await;
        rt.send_message("second").await;

        let rejection = rt
            .wait_for(WAIT, |e| matches!(e, SseEvent::Error { .. }))
            .await
            .unwrap();
        let SseEvent::Error { message } = rejection else {
            unreachable!()
        };
        assert!(message.contains("still streaming"));

        assert!(rt.wait_for_idle(WAIT).await);
        let contents: Vec<String> = rt
            .stored()
            .unwrap()
            .messages
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "slow reply here"]);
        assert_eq!(rt.client.recorded_stream_requests().len(), 1);
    }

    /// Integration test: malformed quiz reply is corrected, then accepted
    #[tokio::test]
    async fn test_quiz_retry_then_question() {
        let client = MockCompletionClient::new();
        client.queue_stream(["no json here"]);
        client.queue_stream([QuizType::MultipleChoice.example_question()]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send(Event::SwitchMode {
            mode: Mode::Quiz,
            entity_name: None,
        })
        .await;
        rt.send_message("planets").await;
        let requested = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::QuizTypeRequested { .. }))
            .await;
        assert_eq!(
            requested,
            Some(EngineEvent::QuizTypeRequested {
                topic: "planets".to_string()
            })
        );

        rt.send(Event::SelectQuizType {
            quiz_type: QuizType::MultipleChoice,
        })
        .await;
        let retrying = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::QuizRetrying { .. }))
            .await
            .unwrap();
        assert!(matches!(retrying, EngineEvent::QuizRetrying { attempt: 1, .. }));
        assert!(rt.wait_for_idle(WAIT).await);

        let snapshot = rt.snapshot();
        let quiz = snapshot.state.quiz.unwrap();
        assert_eq!(quiz.topic, "planets");
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].correct_answer.as_deref(), Some("B"));
        assert_eq!(snapshot.state.quiz_retry_attempts, 0);

        let requests = rt.client.recorded_stream_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].system.contains("MULTIPLE CHOICE quiz"));
        let correction = &requests[1].messages.last().unwrap().text;
        assert!(correction.starts_with("Quick reminder"));
        // The failed reply is not part of the retried history
        assert!(requests[1].messages.iter().all(|m| m.text != "no json here"));

        // Question reply is stored with its record and no visible text
        let stored = rt.stored().unwrap();
        let reply = stored.messages.last().unwrap();
        assert!(reply.content.is_empty());
        assert!(matches!(reply.quiz, Some(QuizRecord::Question(_))));
        assert!(stored.messages.iter().any(|m| m.is_hidden));
    }

    /// Integration test: a full quiz ends back in standard mode
    #[tokio::test]
    async fn test_quiz_complete_returns_to_standard() {
        let client = MockCompletionClient::new();
        client.queue_stream([QuizType::MultipleChoice.example_question()]);
        client.queue_stream([FEEDBACK_EXAMPLE]);
        client.queue_stream([COMPLETE_EXAMPLE]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send(Event::SwitchMode {
            mode: Mode::Quiz,
            entity_name: None,
        })
        .await;
        rt.send_message("orbits").await;
        rt.send(Event::SelectQuizType {
            quiz_type: QuizType::MultipleChoice,
        })
        .await;
        assert!(rt.wait_for_reply(WAIT).await);

        rt.send_message("B").await;
        assert!(rt.wait_for_reply(WAIT).await);
        let answered = rt.snapshot().state.quiz.unwrap();
        assert_eq!(answered.questions[0].is_correct, Some(true));

        rt.send(Event::ContinueQuiz).await;
        let completed = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::QuizCompleted { .. }))
            .await
            .unwrap();
        assert!(matches!(
            completed,
            EngineEvent::QuizCompleted { percentage: 80, .. }
        ));
        assert!(rt.wait_for_idle(WAIT).await);

        let state = rt.snapshot().state;
        assert_eq!(state.mode, Mode::Standard);
        assert!(state.quiz.is_none());
    }

    /// Integration test: frustration failure removes its hidden trigger
    #[tokio::test]
    async fn test_failed_frustration_request_removes_trigger() {
        let client = MockCompletionClient::new();
        client.queue_stream(["Cells are small."]);
        client.queue_open_error(LlmError::throttled("slow down"));

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("What is a cell?").await;
        assert!(rt.wait_for_reply(WAIT).await);

        rt.send(Event::Frustration).await;
        let notice = rt
            .wait_for_notice(WAIT, |e| matches!(e, EngineEvent::Error(_)))
            .await
            .unwrap();
        assert!(matches!(
            notice,
            EngineEvent::Error(ErrorNotice::RateLimited { .. })
        ));
        assert!(rt.wait_for_idle(WAIT).await);

        let stored = rt.stored().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert!(stored.messages.iter().all(|m| !m.is_hidden));
        assert!(rt.snapshot().state.frustration_available);

        // The trigger itself went out as the last turn
        let requests = rt.client.recorded_stream_requests();
        assert!(requests[1].messages.last().unwrap().text.contains("frustrated"));
    }

    /// Integration test: the mode switch notice is sent exactly once
    #[tokio::test]
    async fn test_mode_switch_notice_sent_once() {
        let client = MockCompletionClient::new();
        client.queue_stream(["one"]);
        client.queue_stream(["two"]);
        client.queue_stream(["three"]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("first").await;
        assert!(rt.wait_for_reply(WAIT).await);
        rt.send(Event::SwitchMode {
            mode: Mode::Debate,
            entity_name: None,
        })
        .await;
        rt.send_message("second").await;
        assert!(rt.wait_for_reply(WAIT).await);
        rt.send_message("third").await;
        assert!(rt.wait_for_reply(WAIT).await);

        let systems: Vec<String> = rt
            .client
            .recorded_stream_requests()
            .into_iter()
            .map(|r| r.system)
            .collect();
        assert!(!systems[0].contains("MODE SWITCH"));
        assert!(systems[1].contains("switched from standard mode to debate mode"));
        assert!(!systems[2].contains("MODE SWITCH"));
        assert!(systems[2].contains("DEBATE MODE ACTIVE"));
    }

    /// Integration test: an active timer adds the pacing directive
    #[tokio::test]
    async fn test_pacing_directive_reaches_prompt() {
        let client = MockCompletionClient::new();
        client.queue_stream(["ok"]);

        let mut rt = TestRuntime::new().client(client).build();
        rt.send(Event::TimerStart {
            duration: TimeDelta::minutes(30),
            at: Utc::now() - TimeDelta::minutes(10),
        })
        .await;
        rt.send_message("Let's begin").await;
        assert!(rt.wait_for_reply(WAIT).await);

        let system = &rt.client.recorded_stream_requests()[0].system;
        assert!(system.contains("SESSION PACING:"));
        assert!(rt.snapshot().state.timer.is_active);
    }

    /// Integration test: title generation replaces the truncated title
    #[tokio::test]
    async fn test_generated_title_is_applied() {
        let client = MockCompletionClient::new();
        client.queue_stream(["It is about forces."]);
        client.queue_completion("Newton's First Law");

        let mut rt = TestRuntime::new().client(client).build();
        rt.send_message("What is Newton's first law of motion and why does it matter so much?")
            .await;
        let changed = rt
            .wait_for(WAIT, |e| matches!(e, SseEvent::TitleChanged { .. }))
            .await;
        assert!(matches!(
            changed,
            Some(SseEvent::TitleChanged { title }) if title == "Newton's First Law"
        ));
    }
}
