//! Time utilities for rollcall
//!
//! Report timestamps are wall-clock only; the engine never needs monotonic
//! deadlines because sampling cadence is owned by the scheduler.

use chrono::{DateTime, Local};

/// Get the current local time.
#[allow(clippy::disallowed_methods)]
pub fn now() -> DateTime<Local> {
    Local::now()
}
