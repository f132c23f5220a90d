//! In-process state bus for the radar engine.
//!
//! The engine publishes every visible state change as a [`StateEvent`];
//! presentation layers subscribe through [`EventBus::subscribe`].

pub mod bus;

pub use bus::{EventBus, NoticeLevel, StateEvent};
