//! Headless driver for the radar engine.

pub mod config;
pub mod monitor;
