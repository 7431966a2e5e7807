//! Conversation orchestration state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{CompletionPlan, Effect, EngineEvent};
#[cfg(test)]
pub use effect::ErrorNotice;
pub use event::Event;
pub use state::{EngineState, Lens, Mode, StateView};
pub use transition::{transition, TransitionError};
