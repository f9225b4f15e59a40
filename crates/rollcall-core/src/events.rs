//! Core events emitted by the engine

use rollcall_api::SessionEndReason;
use rollcall_util::{ChannelId, SessionId};
use std::time::Duration;

/// Events emitted by the session engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Sampler armed for a channel
    SessionStarted {
        session_id: SessionId,
        channel: ChannelId,
        interval: Duration,
    },

    /// One snapshot appended to storage
    SnapshotRecorded {
        session_id: SessionId,
        tick: u64,
        members: usize,
    },

    /// A snapshot could not be written; the session keeps sampling
    SnapshotWriteFailed {
        session_id: SessionId,
        tick: u64,
        message: String,
    },

    /// The last instructor left the channel
    InstructorLeft {
        session_id: SessionId,
        channel: ChannelId,
    },

    /// Sampler back to Idle
    SessionEnded {
        session_id: SessionId,
        reason: SessionEndReason,
        ticks: u64,
    },
}

impl From<&crate::SessionSummary> for CoreEvent {
    fn from(summary: &crate::SessionSummary) -> Self {
        CoreEvent::SessionEnded {
            session_id: summary.session_id,
            reason: summary.reason,
            ticks: summary.ticks,
        }
    }
}
