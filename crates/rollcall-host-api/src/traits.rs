//! Host boundary traits

use async_trait::async_trait;
use rollcall_util::{ChannelId, ParticipantId};
use thiserror::Error;

/// Errors from channel membership queries
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Live view of who is connected to a voice channel
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Participants currently connected to `channel`.
    ///
    /// Errors are transient from the engine's point of view: a sampling tick
    /// that cannot resolve its channel is skipped.
    async fn members(&self, channel: ChannelId) -> HostResult<Vec<ParticipantId>>;

    /// Check if the gateway connection is healthy
    fn is_healthy(&self) -> bool {
        true
    }
}
