//! Authorization gate

use rollcall_store::Store;
use rollcall_util::ParticipantId;
use std::sync::Arc;
use tracing::{debug, warn};

/// Decides whether an actor may issue management commands.
///
/// The owner is always authorized; everyone else must be in the instructor
/// registry. The registry is read from the store on every check so changes
/// take effect immediately.
pub struct AuthorizationGate {
    owner: ParticipantId,
    store: Arc<dyn Store>,
}

impl AuthorizationGate {
    pub fn new(owner: ParticipantId, store: Arc<dyn Store>) -> Self {
        Self { owner, store }
    }

    /// Owner or registered instructor; `false` if the registry can't be read
    pub fn is_authorized(&self, actor: ParticipantId) -> bool {
        if actor == self.owner {
            return true;
        }

        match self.store.load_instructors() {
            Ok(instructors) => instructors.contains(&actor),
            Err(e) => {
                warn!(actor = %actor, error = %e, "Instructor registry unreadable, denying");
                false
            }
        }
    }

    /// Whether any of `members` is a registered instructor.
    ///
    /// The owner only counts when registered.
    pub fn any_instructor(&self, members: &[ParticipantId]) -> Option<bool> {
        match self.store.load_instructors() {
            Ok(instructors) => Some(contains_instructor(members, &instructors)),
            Err(e) => {
                debug!(error = %e, "Instructor registry unreadable");
                None
            }
        }
    }
}

pub fn contains_instructor(members: &[ParticipantId], instructors: &[ParticipantId]) -> bool {
    members.iter().any(|m| instructors.contains(m))
}
