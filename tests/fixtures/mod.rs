//! Test fixtures for bus-motion.
//!
//! Provides routes around Santa Cruz de la Sierra, where the tracked
//! school buses run.

pub mod santa_cruz_routes;

pub use santa_cruz_routes::*;
