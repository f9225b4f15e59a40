//! Domain and protocol types for rollcall
//!
//! This crate defines the types shared between the store, the core engine and
//! the service binary:
//! - Session settings, snapshots and attendance reports
//! - Commands (requests from the chat front-end) and responses
//! - Events (service -> front-end)

mod commands;
mod events;
mod types;

pub use commands::*;
pub use events::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
