//! Chat platform boundary for rollcall
//!
//! This crate defines the interface between the engine and the chat platform's
//! voice gateway. It contains no platform code itself; [`MemoryDirectory`] is a
//! directory fed by presence updates, used by the service and by tests.

mod memory;
mod traits;

pub use memory::*;
pub use traits::*;
