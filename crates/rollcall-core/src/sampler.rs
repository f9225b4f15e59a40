//! Presence sampler plumbing
//!
//! A tick is split in two: [`crate::SessionEngine::begin_tick`] hands out a
//! [`TickTicket`], the caller resolves channel membership wherever it likes
//! (usually off the event loop), and [`crate::SessionEngine::complete_tick`]
//! records the outcome. Only one ticket is outstanding at a time.

use rollcall_util::{ChannelId, SessionId};

use crate::SessionSummary;

/// Cooperative cancellation flag, checked at the top of every tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelToken {
    requested: bool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&mut self) {
        self.requested = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested
    }
}

/// Work order for one sampling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickTicket {
    pub session_id: SessionId,
    pub channel: ChannelId,
    /// 1-based tick number within the session
    pub tick: u64,
}

/// Outcome of firing the sampler timer
#[derive(Debug, Clone, PartialEq)]
pub enum TickStart {
    /// Resolve membership for the ticket, then complete it
    Sample(TickTicket),

    /// Cancellation was pending; the tick was counted and the session ended.
    ///
    /// Stop requests and instructor loss already finish the session when no
    /// tick is in flight, so the engine's own operations never leave a
    /// cancel for the timer to find. Kept so a timer racing a cancel still
    /// ends the session instead of sampling it.
    Cancelled(SessionSummary),

    /// The previous tick has not completed yet
    Busy,

    /// No session
    Idle,
}
