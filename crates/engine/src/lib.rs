//! Scan orchestration and reconciliation engine.
//!
//! [`RadarEngine`] drives a two-phase scan (compile a strategy, dispatch
//! it to the producer) and follows the running job through two channels
//! at once: a push listener on the change feed and a bounded poll on the
//! durable store. Both feed one reconciler, a watchdog force-completes
//! jobs that go silent, and every terminal transition goes through a
//! single idempotent function on [`JobStateStore`].

pub mod config;
pub mod engine;
pub mod reconciler;
pub mod reconnect;
pub mod session;
pub mod state;

mod context;
mod controller;
mod feedback;
mod observers;
mod poll;
mod push;
mod recovery;
mod watchdog;

pub use config::EngineConfig;
pub use engine::{Collaborators, RadarEngine};
pub use feedback::RecalibrationReport;
pub use reconciler::{MergeOutcome, ResultReconciler};
pub use state::{JobStateStore, Snapshot};
