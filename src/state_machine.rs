//! Session state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition(state, event)` returns the next state plus the effects the
//! executor must run. A session is either idle or processing one turn.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{ClarityOutput, Message, Role, SessionState, ToolCall, REFLECTION_POINT};
pub use transition::{transition, TransitionError};
