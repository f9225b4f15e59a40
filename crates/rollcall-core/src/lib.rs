//! Attendance session engine for rollcall
//!
//! This crate is the heart of rollcall, containing:
//! - The authorization gate (instructor registry + owner)
//! - Session state machine (Idle -> Running -> Cancelling -> Idle)
//! - Presence sampling with cooperative cancellation
//! - Attendance aggregation over recorded snapshots

mod auth;
mod engine;
mod error;
mod events;
mod report;
mod sampler;
mod session;

pub use auth::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use report::*;
pub use sampler::*;
pub use session::*;
