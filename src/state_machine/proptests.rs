//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::db::{MessageRole, Session};
use crate::llm::LlmError;
use crate::quiz::{QuizType, COMPLETE_EXAMPLE};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// Apply an event and its session effects; rejected events leave both untouched
fn apply(state: &mut EngineState, session: &mut Session, event: Event) -> bool {
    match transition(state, session, event) {
        Ok(result) => {
            for effect in &result.effects {
                effect.apply(session);
            }
            *state = result.new_state;
            true
        }
        Err(_) => false,
    }
}

fn holds_mutual_exclusion(state: &EngineState) -> bool {
    (state.mode == Mode::Standard || state.lens.is_none())
        && (state.lens.is_none() || state.mode == Mode::Standard)
}

fn quiz_only_in_quiz_mode(state: &EngineState) -> bool {
    (state.quiz.is_none() && state.pending_quiz_topic.is_none()) || state.mode == Mode::Quiz
}

fn placeholder_exists(state: &EngineState, session: &Session) -> bool {
    state
        .in_flight()
        .map_or(true, |f| session.message(&f.placeholder_id).is_some())
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_mode() -> impl Strategy<Value = Mode> {
    prop_oneof![
        Just(Mode::Standard),
        Just(Mode::Writing),
        Just(Mode::Debate),
        Just(Mode::Mimic),
        Just(Mode::Quiz),
    ]
}

fn arb_lens() -> impl Strategy<Value = Option<Lens>> {
    prop_oneof![
        Just(None),
        Just(Some(Lens::new("Star Wars", "Learn through Star Wars analogies"))),
        Just(Some(Lens::new("Minecraft", "Learn through Minecraft building and crafting"))),
        Just(Some(Lens::new("None", "No thematic lens"))),
    ]
}

fn arb_quiz_type() -> impl Strategy<Value = QuizType> {
    prop_oneof![Just(QuizType::MultipleChoice), Just(QuizType::ExtendedResponse)]
}

/// User or stream actions; stream actions target whatever request is current
#[derive(Debug, Clone)]
enum Action {
    Send(String),
    SwitchMode(Mode),
    ApplyLens(Option<Lens>),
    SelectQuizType(QuizType),
    Frustration,
    ContinueQuiz,
    Cancel,
    Chunk(String),
    Complete(String),
    Fail,
}

fn arb_reply() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,30}",
        Just(COMPLETE_EXAMPLE.to_string()),
        Just(QuizType::MultipleChoice.example_question().to_string()),
        Just(QuizType::ExtendedResponse.example_question().to_string()),
    ]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        "[a-zA-Z ]{0,20}".prop_map(Action::Send),
        arb_mode().prop_map(Action::SwitchMode),
        arb_lens().prop_map(Action::ApplyLens),
        arb_quiz_type().prop_map(Action::SelectQuizType),
        Just(Action::Frustration),
        Just(Action::ContinueQuiz),
        Just(Action::Cancel),
        "[a-z]{1,8}".prop_map(Action::Chunk),
        arb_reply().prop_map(Action::Complete),
        Just(Action::Fail),
    ]
}

fn to_event(state: &EngineState, action: Action) -> Event {
    let request_id = state.in_flight().map_or(u64::MAX, |f| f.request_id);
    match action {
        Action::Send(text) => Event::UserMessage { text },
        Action::SwitchMode(mode) => Event::SwitchMode {
            mode,
            entity_name: None,
        },
        Action::ApplyLens(lens) => Event::ApplyLens { lens },
        Action::SelectQuizType(quiz_type) => Event::SelectQuizType { quiz_type },
        Action::Frustration => Event::Frustration,
        Action::ContinueQuiz => Event::ContinueQuiz,
        Action::Cancel => Event::UserCancel,
        Action::Chunk(text) => Event::StreamChunk { request_id, text },
        Action::Complete(full_text) => Event::StreamComplete {
            request_id,
            full_text,
        },
        Action::Fail => Event::StreamFailed {
            request_id,
            error: LlmError::unreachable("offline"),
        },
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: mode and lens stay mutually exclusive, quiz state lives
    // only in quiz mode, and a streaming request always has its placeholder
    #[test]
    fn prop_invariants_hold_after_any_sequence(
        actions in proptest::collection::vec(arb_action(), 0..40)
    ) {
        let mut state = EngineState::default();
        let mut session = Session::new();

        for action in actions {
            let event = to_event(&state, action);
            apply(&mut state, &mut session, event);
            prop_assert!(holds_mutual_exclusion(&state), "mode/lens: {:?}", state);
            prop_assert!(quiz_only_in_quiz_mode(&state), "quiz state: {:?}", state);
            prop_assert!(placeholder_exists(&state, &session));
            prop_assert!(state.quiz_retry.attempts() < crate::quiz::MAX_QUIZ_ATTEMPTS);
        }
    }

    // Invariant 2: lens selection always lands in standard mode
    #[test]
    fn prop_lens_forces_standard(mode in arb_mode(), lens in arb_lens()) {
        let mut session = Session::new();
        session.messages.push(crate::db::Message::user("hi", mode, None));
        let state = EngineState { mode, ..EngineState::default() };

        let result = transition(&state, &session, Event::ApplyLens { lens }).unwrap();
        if result.new_state.lens.is_some() {
            prop_assert_eq!(result.new_state.mode, Mode::Standard);
        }
        prop_assert!(holds_mutual_exclusion(&result.new_state));
    }

    // Invariant 3: committed content is the in-order concatenation of fragments
    #[test]
    fn prop_fragments_concatenate_in_order(
        fragments in proptest::collection::vec(".{0,12}", 0..20)
    ) {
        let mut state = EngineState::default();
        let mut session = Session::new();
        prop_assert!(apply(&mut state, &mut session, Event::UserMessage { text: "go".to_string() }), "apply(UserMessage) returned false");
        let in_flight = state.in_flight().unwrap().clone();

        for text in &fragments {
            apply(&mut state, &mut session, Event::StreamChunk {
                request_id: in_flight.request_id,
                text: text.clone(),
            });
        }
        let expected: String = fragments.concat();
        prop_assert_eq!(&session.message(&in_flight.placeholder_id).unwrap().content, &expected);

        apply(&mut state, &mut session, Event::StreamComplete {
            request_id: in_flight.request_id,
            full_text: expected.clone(),
        });
        prop_assert_eq!(&session.message(&in_flight.placeholder_id).unwrap().content, &expected);
        prop_assert!(!state.is_busy());
    }

    // Invariant 4: sends, mode changes and lens changes are rejected, never
    // queued, while streaming
    #[test]
    fn prop_busy_rejects_sends(
        text in "[a-zA-Z]{1,20}",
        mode in arb_mode(),
        lens in arb_lens(),
    ) {
        let mut state = EngineState::default();
        let mut session = Session::new();
        apply(&mut state, &mut session, Event::UserMessage { text: "first".to_string() });
        let before = session.messages.len();

        let result = transition(&state, &session, Event::UserMessage { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        let result = transition(&state, &session, Event::SwitchMode { mode, entity_name: None });
        prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        let result = transition(&state, &session, Event::ApplyLens { lens });
        prop_assert_eq!(result.unwrap_err(), TransitionError::Busy);
        prop_assert_eq!(session.messages.len(), before);
    }

    // Invariant 5: frustration is gated by user-message count
    #[test]
    fn prop_frustration_gate(activation in 1usize..20, later in 0usize..30) {
        let mut gate = FrustrationGate::default();
        gate.record(activation);
        prop_assert_eq!(
            gate.is_available(activation + later),
            later >= FRUSTRATION_COOLDOWN_MESSAGES
        );
    }

    // Invariant 6: a valid quiz_complete always ends the quiz in standard mode
    #[test]
    fn prop_quiz_complete_exits(
        prior in arb_mode(),
        quiz_type in arb_quiz_type(),
        lens in arb_lens(),
    ) {
        let mut state = EngineState { mode: prior, lens: lens.filter(|_| prior == Mode::Standard), ..EngineState::default() };
        let mut session = Session::new();
        if prior != Mode::Quiz {
            prop_assert!(apply(&mut state, &mut session, Event::SwitchMode { mode: Mode::Quiz, entity_name: None }), "apply(SwitchMode) returned false");
        }
        prop_assert!(apply(&mut state, &mut session, Event::UserMessage { text: "volcanoes".to_string() }), "apply(UserMessage) returned false");
        prop_assert!(apply(&mut state, &mut session, Event::SelectQuizType { quiz_type }), "apply(SelectQuizType) returned false");
        let request_id = state.in_flight().unwrap().request_id;
        prop_assert!(apply(&mut state, &mut session, Event::StreamComplete {
            request_id,
            full_text: COMPLETE_EXAMPLE.to_string(),
        }), "apply(StreamComplete) returned false");

        prop_assert_eq!(state.mode, Mode::Standard);
        prop_assert!(state.quiz.is_none());
    }

    // Invariant 7: cancelling leaves no partial assistant content behind
    #[test]
    fn prop_cancel_leaves_pre_send_state(
        fragments in proptest::collection::vec("[a-z]{1,8}", 1..10)
    ) {
        let mut state = EngineState::default();
        let mut session = Session::new();
        apply(&mut state, &mut session, Event::UserMessage { text: "question".to_string() });
        let request_id = state.in_flight().unwrap().request_id;
        for text in fragments {
            apply(&mut state, &mut session, Event::StreamChunk { request_id, text });
        }

        prop_assert!(apply(&mut state, &mut session, Event::UserCancel));
        prop_assert!(!state.is_busy());
        prop_assert_eq!(session.messages.len(), 1);
        prop_assert!(session.messages.iter().all(|m| m.role == MessageRole::User));
    }
}
