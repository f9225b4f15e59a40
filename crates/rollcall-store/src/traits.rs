//! Store trait definitions

use rollcall_api::{SessionSettings, Snapshot};
use rollcall_util::ParticipantId;

use crate::StoreResult;

/// Record holding the instructor registry
pub const INSTRUCTORS_KEY: &str = "instructors";

/// Record holding the session settings
pub const SETTINGS_KEY: &str = "settings";

/// Record holding the snapshot sequence
pub const SNAPSHOTS_KEY: &str = "snapshots";

/// Main store trait.
///
/// Every method reads or writes a whole record; there is no field-level update
/// and no caching, so each call touches storage. Callers that change a record
/// read it, mutate it in memory and write it back (see [`crate::VerifiedStore`]).
pub trait Store: Send + Sync {
    // Instructor registry

    /// Load the instructor registry (empty if never written)
    fn load_instructors(&self) -> StoreResult<Vec<ParticipantId>>;

    /// Replace the instructor registry
    fn save_instructors(&self, instructors: &[ParticipantId]) -> StoreResult<()>;

    // Settings

    /// Load the session settings; `NotFound` before first-run seeding
    fn load_settings(&self) -> StoreResult<SessionSettings>;

    /// Replace the session settings
    fn save_settings(&self, settings: &SessionSettings) -> StoreResult<()>;

    // Snapshots

    /// Load all snapshots in recording order (empty if never written)
    fn load_snapshots(&self) -> StoreResult<Vec<Snapshot>>;

    /// Replace the snapshot sequence
    fn save_snapshots(&self, snapshots: &[Snapshot]) -> StoreResult<()>;

    // Lifecycle

    /// Seed missing records and truncate snapshots.
    ///
    /// Called once per process start. Existing instructors and settings are
    /// left untouched; snapshots are always reset to empty so a stale session
    /// can never resume.
    fn prepare_for_startup(
        &self,
        defaults: &SessionSettings,
        seed_instructors: &[ParticipantId],
    ) -> StoreResult<()>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
