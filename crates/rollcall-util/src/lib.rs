//! Shared utilities for rollcall
//!
//! This crate provides:
//! - ID types (ParticipantId, ChannelId, SessionId)
//! - Wall-clock time
//! - Default paths for config and data directories

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
