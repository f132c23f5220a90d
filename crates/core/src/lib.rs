//! Domain model for the radar scan engine.
//!
//! Pure types and traits with no I/O of their own: the job lifecycle,
//! result records and their normalization, feedback payloads, and the
//! collaborator seams the engine is wired against.

pub mod env;
pub mod error;
pub mod interaction;
pub mod job;
pub mod ports;
pub mod radar_events;
pub mod record;
pub mod rows;
pub mod strategy;
pub mod types;
