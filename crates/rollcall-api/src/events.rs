//! Event types for service -> front-end streaming

use chrono::{DateTime, Local};
use rollcall_util::{ChannelId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, SessionEndReason};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: rollcall_util::now(),
            payload,
        }
    }
}

/// All possible events from the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    SessionStarted {
        session_id: SessionId,
        channel: ChannelId,
        snapshot_interval_seconds: u64,
    },

    SnapshotRecorded {
        session_id: SessionId,
        tick: u64,
        members: usize,
    },

    /// A snapshot could not be written; sampling continues
    SnapshotWriteFailed {
        session_id: SessionId,
        tick: u64,
        message: String,
    },

    /// No instructor was left in the channel; the session is stopping
    InstructorLeft {
        session_id: SessionId,
        channel: ChannelId,
    },

    SessionEnded {
        session_id: SessionId,
        reason: SessionEndReason,
        ticks: u64,
    },
}
