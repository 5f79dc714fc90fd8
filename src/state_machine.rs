//! Report dialogue state machine
//!
//! One session per identity. Transitions are pure: they take the current
//! session and an event and return the next session plus the effects the
//! runtime must carry out.

mod effect;
pub mod event;
pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{AdminCommand, Delivery, Effect, Notice, Prompt};
pub use event::Event;
pub use state::{AdminAction, DialogState, Report, Session, StateKind, TargetId};
pub use transition::{transition, DialogContext};
