//! In-memory channel directory

use async_trait::async_trait;
use rollcall_util::{ChannelId, ParticipantId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{ChannelDirectory, HostError, HostResult};

/// Channel directory maintained from join/leave updates
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    channels: Arc<Mutex<HashMap<ChannelId, Vec<ParticipantId>>>>,

    /// Queries fail as if the gateway were down
    fail_queries: Arc<Mutex<bool>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelId, Vec<ParticipantId>>> {
        // Every mutation is a single map operation, so a poisoned map is still consistent
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a participant joining; also creates the channel
    pub fn join(&self, channel: ChannelId, member: ParticipantId) {
        let mut channels = self.channels();
        let members = channels.entry(channel).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
        debug!(channel = %channel, member = %member, "Member joined");
    }

    /// Record a participant leaving; the channel itself stays resolvable
    pub fn leave(&self, channel: ChannelId, member: ParticipantId) {
        if let Some(members) = self.channels().get_mut(&channel) {
            members.retain(|m| *m != member);
        }
        debug!(channel = %channel, member = %member, "Member left");
    }

    /// Make a channel unresolvable
    pub fn remove_channel(&self, channel: ChannelId) {
        self.channels().remove(&channel);
        debug!(channel = %channel, "Channel removed");
    }

    /// Replace a channel's member list
    pub fn set_members(&self, channel: ChannelId, members: impl IntoIterator<Item = ParticipantId>) {
        self.channels().insert(channel, members.into_iter().collect());
    }

    /// Simulate a gateway outage
    pub fn set_failing(&self, failing: bool) {
        *self.fail_queries.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }
}

#[async_trait]
impl ChannelDirectory for MemoryDirectory {
    async fn members(&self, channel: ChannelId) -> HostResult<Vec<ParticipantId>> {
        if *self.fail_queries.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(HostError::Unavailable("simulated gateway outage".into()));
        }

        self.channels()
            .get(&channel)
            .cloned()
            .ok_or(HostError::ChannelNotFound(channel))
    }

    fn is_healthy(&self) -> bool {
        !*self.fail_queries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
