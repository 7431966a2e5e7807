//! Pure state transition function
//!
//! Given the engine state, the session as it currently stands and one event,
//! `transition` decides the next state and the effects to run. It performs no
//! I/O; the runtime executes the effects in order before the next event.

use super::effect::{CompletionPlan, EngineEvent, ErrorNotice};
use super::state::{EngineState, InFlight, Lens, Mode, Phase, QuizSession, RequestKind};
use super::{Effect, Event};
use crate::db::{Message, Session};
use crate::quiz::{parse_record, QuizRecord, RetryDecision, EXHAUSTED_MESSAGE};
use crate::system_prompt::{
    lens_activation_instruction, lens_transition_instruction, PromptContext,
    CONTINUE_QUIZ_INSTRUCTION, FRUSTRATION_INSTRUCTION, QUIZ_ENDED_INSTRUCTION,
};
use std::time::Duration;
use thiserror::Error;

/// Pause between quiz feedback and moving to the next question
const QUIZ_ADVANCE_DELAY: Duration = Duration::from_millis(1500);

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: EngineState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: EngineState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A response is still streaming (cancel it first)")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("No quiz topic is waiting for a quiz type")]
    NoPendingQuizTopic,
    #[error("Frustration help is not available yet")]
    FrustrationCoolingDown,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)] // One arm per event
pub fn transition(
    state: &EngineState,
    session: &Session,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let mut next = state.clone();

    match event {
        // ============================================================
        // User input
        // ============================================================
        Event::UserMessage { text } => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }

            // Quiz mode without a quiz: the text is the topic, ask for a type
            if state.mode == Mode::Quiz && state.quiz.is_none() {
                if state.pending_quiz_topic.is_some() {
                    return Err(TransitionError::InvalidTransition(
                        "choose a quiz type for the pending topic first".to_string(),
                    ));
                }
                next.pending_quiz_topic = Some(text.to_string());
                return Ok(TransitionResult::new(next).with_effect(Effect::Notify(
                    EngineEvent::QuizTypeRequested {
                        topic: text.to_string(),
                    },
                )));
            }

            let effects = send_user_text(&mut next, session, text);
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::SelectQuizType { quiz_type } => {
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }
            let topic = next
                .pending_quiz_topic
                .take()
                .ok_or(TransitionError::NoPendingQuizTopic)?;
            next.quiz = Some(QuizSession::new(topic.clone(), quiz_type));
            let effects = send_user_text(&mut next, session, &topic);
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::CancelQuizSetup => {
            next.pending_quiz_topic
                .take()
                .ok_or(TransitionError::NoPendingQuizTopic)?;
            Ok(TransitionResult::new(next))
        }

        Event::SwitchMode { mode, entity_name } => {
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }
            let previous = state.mode;
            // Selecting the active mode toggles back to standard
            let target = if mode == previous { Mode::Standard } else { mode };
            if target == previous {
                return Ok(TransitionResult::new(next));
            }

            let mut effects = Vec::new();
            if previous == Mode::Quiz {
                exit_quiz(&mut next, session, target, &mut effects);
            }
            if !session.is_empty() {
                next.switched_from = Some(previous);
            }
            next.mode = target;
            if target != Mode::Standard {
                next.lens = None;
            }
            next.entity_name = if target == Mode::Mimic {
                entity_name
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
            } else {
                None
            };

            if !effects.is_empty() {
                effects.push(Effect::PersistSession);
            }
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::ApplyLens { lens } => {
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }
            let lens = lens.filter(|l| !l.name.eq_ignore_ascii_case("none"));
            let changed = lens_name(state.lens.as_ref()) != lens_name(lens.as_ref());

            let mut effects = Vec::new();
            if lens.is_some() && state.mode != Mode::Standard {
                if state.mode == Mode::Quiz {
                    exit_quiz(&mut next, session, Mode::Standard, &mut effects);
                }
                if !session.is_empty() {
                    next.switched_from = Some(state.mode);
                }
                next.mode = Mode::Standard;
                next.entity_name = None;
            }

            // An empty conversation announces the lens with its first message instead
            if changed && !session.is_empty() {
                effects.push(Effect::AppendMessage(Message::hidden(
                    lens_transition_instruction(state.lens.as_ref(), lens.as_ref()),
                    next.mode,
                    lens.as_ref(),
                )));
            }
            next.lens = lens;

            if !effects.is_empty() {
                effects.push(Effect::PersistSession);
            }
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::Frustration => {
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }
            let user_messages = session.user_message_count();
            if !state.frustration.is_available(user_messages) {
                return Err(TransitionError::FrustrationCoolingDown);
            }

            let mut effects = Vec::new();
            if state.mode == Mode::Quiz {
                exit_quiz(&mut next, session, Mode::Standard, &mut effects);
            }
            if state.mode != Mode::Standard {
                next.switched_from = Some(state.mode);
            }
            next.mode = Mode::Standard;
            next.lens = None;
            next.entity_name = None;

            let trigger = Message::hidden(FRUSTRATION_INSTRUCTION, Mode::Standard, None);
            let trigger_id = trigger.id.clone();
            effects.push(Effect::AppendMessage(trigger));
            effects.push(Effect::PersistSession);
            effects.extend(start_request(
                &mut next,
                RequestKind::Frustration,
                vec![trigger_id],
            ));
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::ContinueQuiz => {
            if state.is_busy() {
                return Err(TransitionError::Busy);
            }
            if state.active_quiz().is_none() {
                return Err(TransitionError::InvalidTransition(
                    "no active quiz to continue".to_string(),
                ));
            }

            let trigger = Message::hidden(CONTINUE_QUIZ_INSTRUCTION, Mode::Quiz, None);
            let trigger_id = trigger.id.clone();
            let effects = start_request(&mut next, RequestKind::QuizContinue, vec![trigger_id]);
            Ok(TransitionResult::new(next)
                .with_effect(Effect::AppendMessage(trigger))
                .with_effect(Effect::PersistSession)
                .with_effects(effects))
        }

        Event::UserCancel => {
            let Some(in_flight) = state.in_flight() else {
                return Ok(TransitionResult::new(next));
            };
            next.phase = Phase::Idle;
            if matches!(in_flight.kind, RequestKind::QuizRetry { .. }) {
                next.quiz_retry.reset();
            }

            let mut ids = vec![in_flight.placeholder_id.clone()];
            ids.extend(in_flight.trigger_ids.iter().cloned());
            Ok(TransitionResult::new(next)
                .with_effect(Effect::AbortCompletion)
                .with_effect(Effect::RemoveMessages { ids })
                .with_effect(Effect::PersistSession))
        }

        // ============================================================
        // Streaming
        // ============================================================
        Event::StreamChunk { request_id, text } => {
            let Some(in_flight) = state.current_request(request_id) else {
                return Ok(TransitionResult::new(next));
            };
            Ok(TransitionResult::new(next).with_effect(Effect::AppendFragment {
                message_id: in_flight.placeholder_id.clone(),
                text,
            }))
        }

        Event::StreamComplete {
            request_id,
            full_text,
        } => {
            let Some(in_flight) = state.current_request(request_id).cloned() else {
                return Ok(TransitionResult::new(next));
            };
            next.phase = Phase::Idle;
            // Cooldown starts once help was delivered
            if in_flight.kind == RequestKind::Frustration {
                next.frustration.record(session.user_message_count());
            }

            let effects = match state.active_quiz().map(|q| q.quiz_type) {
                Some(quiz_type) => match parse_record(&full_text, quiz_type) {
                    Ok(record) => apply_quiz_record(&mut next, session, &in_flight, record),
                    Err(violation) => {
                        match next
                            .quiz_retry
                            .record_failure(&full_text, &violation, quiz_type)
                        {
                            RetryDecision::Retry { attempt, prompt } => {
                                let correction = Message::hidden(prompt, Mode::Quiz, None);
                                let correction_id = correction.id.clone();
                                let mut effects = vec![
                                    Effect::RemoveMessages {
                                        ids: vec![in_flight.placeholder_id.clone()],
                                    },
                                    Effect::AppendMessage(correction),
                                    Effect::PersistSession,
                                    Effect::Notify(EngineEvent::QuizRetrying {
                                        attempt,
                                        reason: violation.to_string(),
                                    }),
                                ];
                                effects.extend(start_request(
                                    &mut next,
                                    RequestKind::QuizRetry { attempt },
                                    vec![correction_id],
                                ));
                                effects
                            }
                            RetryDecision::Exhausted => vec![
                                Effect::FinalizeMessage {
                                    message_id: in_flight.placeholder_id.clone(),
                                    content: EXHAUSTED_MESSAGE.to_string(),
                                    quiz: None,
                                },
                                Effect::PersistSession,
                                Effect::Notify(EngineEvent::QuizFailed {
                                    message: EXHAUSTED_MESSAGE.to_string(),
                                }),
                            ],
                        }
                    }
                },
                None => vec![
                    Effect::FinalizeMessage {
                        message_id: in_flight.placeholder_id.clone(),
                        content: full_text,
                        quiz: None,
                    },
                    Effect::PersistSession,
                ],
            };
            Ok(TransitionResult::new(next).with_effects(effects))
        }

        Event::StreamFailed { request_id, error } => {
            let Some(in_flight) = state.current_request(request_id) else {
                return Ok(TransitionResult::new(next));
            };
            next.phase = Phase::Idle;
            if matches!(in_flight.kind, RequestKind::QuizRetry { .. }) {
                next.quiz_retry.reset();
            }

            let mut ids = vec![in_flight.placeholder_id.clone()];
            ids.extend(in_flight.trigger_ids.iter().cloned());
            Ok(TransitionResult::new(next)
                .with_effect(Effect::RemoveMessages { ids })
                .with_effect(Effect::PersistSession)
                .with_effect(Effect::Notify(EngineEvent::Error(ErrorNotice::from(
                    &error,
                )))))
        }

        // ============================================================
        // Deferred and background
        // ============================================================
        Event::QuizAdvance => {
            if let Some(quiz) = next.quiz.as_mut() {
                quiz.advance();
            }
            Ok(TransitionResult::new(next))
        }

        Event::TitleGenerated { title } => {
            let title = title.trim();
            if title.is_empty() {
                return Ok(TransitionResult::new(next));
            }
            Ok(TransitionResult::new(next)
                .with_effect(Effect::SetTitle {
                    title: title.to_string(),
                })
                .with_effect(Effect::PersistSession))
        }

        // ============================================================
        // Pacing timer
        // ============================================================
        Event::TimerStart { duration, at } => {
            if duration <= chrono::TimeDelta::zero() {
                return Err(TransitionError::InvalidTransition(
                    "timer duration must be positive".to_string(),
                ));
            }
            next.timer.start(duration, at);
            Ok(TransitionResult::new(next))
        }

        Event::TimerPause => {
            next.timer.pause();
            Ok(TransitionResult::new(next))
        }

        Event::TimerResume => {
            next.timer.resume();
            Ok(TransitionResult::new(next))
        }

        Event::TimerStop => {
            next.timer.stop();
            Ok(TransitionResult::new(next))
        }

        Event::TimerTick { at } => {
            if next.timer.tick(at) {
                return Ok(TransitionResult::new(next)
                    .with_effect(Effect::Notify(EngineEvent::TimerExpired)));
            }
            Ok(TransitionResult::new(next))
        }
    }
}

fn lens_name(lens: Option<&Lens>) -> Option<&str> {
    lens.map(|l| l.name.as_str())
}

/// Append the user's message (preceded by the lens activation on the first
/// message) and start streaming the reply
fn send_user_text(state: &mut EngineState, session: &Session, text: &str) -> Vec<Effect> {
    let is_first = session.user_message_count() == 0;
    let mut effects = Vec::new();

    if is_first {
        if let Some(lens) = &state.lens {
            effects.push(Effect::AppendMessage(Message::hidden(
                lens_activation_instruction(lens),
                state.mode,
                Some(lens),
            )));
        }
    }
    effects.push(Effect::AppendMessage(Message::user(
        text,
        state.mode,
        state.lens.as_ref(),
    )));
    effects.push(Effect::PersistSession);
    if is_first {
        effects.push(Effect::GenerateTitle {
            text: text.to_string(),
        });
    }
    effects.extend(start_request(state, RequestKind::UserMessage, vec![]));
    effects
}

/// Append the placeholder and issue the request. Consumes the mode switch flag.
fn start_request(
    state: &mut EngineState,
    kind: RequestKind,
    trigger_ids: Vec<String>,
) -> Vec<Effect> {
    let placeholder = Message::placeholder(state.mode, state.lens.as_ref());
    let request_id = state.next_request_id;
    state.next_request_id += 1;

    let plan = CompletionPlan {
        request_id,
        placeholder_id: placeholder.id.clone(),
        prompt: PromptContext {
            mode: state.mode,
            lens: state.lens.clone(),
            entity_name: state.entity_name.clone(),
            quiz_type: state.active_quiz().map(|q| q.quiz_type),
            switched_from: state.switched_from.take(),
            pacing: None,
        },
    };
    state.phase = Phase::Streaming(InFlight {
        request_id,
        placeholder_id: placeholder.id.clone(),
        trigger_ids,
        kind,
    });

    vec![
        Effect::AppendMessage(placeholder),
        Effect::RequestCompletion(plan),
    ]
}

/// Drop all quiz state, announcing the end if the conversation has started
fn exit_quiz(state: &mut EngineState, session: &Session, new_mode: Mode, effects: &mut Vec<Effect>) {
    if !session.is_empty() {
        effects.push(Effect::AppendMessage(Message::hidden(
            QUIZ_ENDED_INSTRUCTION,
            new_mode,
            None,
        )));
    }
    state.quiz = None;
    state.pending_quiz_topic = None;
    state.quiz_retry.reset();
}

/// Commit a parsed record and apply its effect on the quiz
fn apply_quiz_record(
    state: &mut EngineState,
    session: &Session,
    in_flight: &InFlight,
    record: QuizRecord,
) -> Vec<Effect> {
    state.quiz_retry.reset();
    let mut effects = vec![Effect::FinalizeMessage {
        message_id: in_flight.placeholder_id.clone(),
        content: String::new(),
        quiz: Some(record.clone()),
    }];

    match &record {
        QuizRecord::QuizStart { .. } => {}
        QuizRecord::Question(question) => {
            if let Some(quiz) = state.quiz.as_mut() {
                quiz.add_question(question);
            }
        }
        QuizRecord::Feedback(feedback) => {
            let typed_answer = session
                .messages
                .iter()
                .rev()
                .find(|m| m.is_visible_user())
                .map(|m| m.content.as_str());
            if let Some(quiz) = state.quiz.as_mut() {
                quiz.record_feedback(feedback, typed_answer);
            }
            effects.push(Effect::ScheduleQuizAdvance {
                delay: QUIZ_ADVANCE_DELAY,
            });
        }
        QuizRecord::QuizComplete(summary) => {
            if let Some(quiz) = state.quiz.as_mut() {
                quiz.complete(summary);
            }
            effects.push(Effect::Notify(EngineEvent::QuizCompleted {
                score: summary.score.clone(),
                percentage: summary.percentage,
                strengths: summary.strengths.clone(),
                weaknesses: summary.weaknesses.clone(),
                improvement_plan: summary.improvement_plan.clone(),
            }));
            exit_quiz(state, session, Mode::Standard, &mut effects);
            state.switched_from = Some(Mode::Quiz);
            state.mode = Mode::Standard;
        }
    }

    effects.push(Effect::PersistSession);
    effects
}
