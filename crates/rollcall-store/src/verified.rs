//! Verified read-modify-write operations
//!
//! The store offers no transactions, so every setter here reads the whole
//! record, changes it in memory, writes it back and then re-reads it. The
//! returned `bool` is whether the re-read value matches what was intended;
//! the store's contents stay the source of truth either way.

use rollcall_api::{AutoClearEvent, SessionSettings, Snapshot};
use rollcall_util::ParticipantId;
use tracing::{debug, warn};

use crate::{Store, StoreResult};

/// Verified setters on top of any [`Store`]
pub trait VerifiedStore: Store {
    /// Register an instructor; `false` if already registered or not verified
    fn add_instructor(&self, id: ParticipantId) -> StoreResult<bool> {
        let mut instructors = self.load_instructors()?;
        if instructors.contains(&id) {
            return Ok(false);
        }

        instructors.push(id);
        self.save_instructors(&instructors)?;

        let verified = self.load_instructors()?.contains(&id);
        log_verification("instructors", verified);
        Ok(verified)
    }

    /// Unregister an instructor; `false` if not registered or not verified
    fn remove_instructor(&self, id: ParticipantId) -> StoreResult<bool> {
        let mut instructors = self.load_instructors()?;
        if !instructors.contains(&id) {
            return Ok(false);
        }

        instructors.retain(|existing| *existing != id);
        self.save_instructors(&instructors)?;

        let verified = !self.load_instructors()?.contains(&id);
        log_verification("instructors", verified);
        Ok(verified)
    }

    fn set_minimum_attendance_rate(&self, rate: f64) -> StoreResult<bool> {
        update_settings(self, |s| s.minimum_attendance_rate = rate)
    }

    fn set_snapshot_interval(&self, seconds: u64) -> StoreResult<bool> {
        update_settings(self, |s| s.snapshot_interval_seconds = seconds)
    }

    fn set_auto_clear(&self, event: AutoClearEvent, enabled: bool) -> StoreResult<bool> {
        update_settings(self, |s| match event {
            AutoClearEvent::NewSession => s.auto_clear_on_new_session = enabled,
            AutoClearEvent::AfterReport => s.auto_clear_after_report = enabled,
        })
    }

    fn set_responses_ephemeral(&self, enabled: bool) -> StoreResult<bool> {
        update_settings(self, |s| s.responses_are_ephemeral = enabled)
    }

    /// Append one snapshot to the end of the sequence.
    ///
    /// Not verified: a lost snapshot is tolerated by the sampler, so only
    /// storage errors are reported.
    fn append_snapshot(&self, snapshot: Snapshot) -> StoreResult<usize> {
        let mut snapshots = self.load_snapshots()?;
        snapshots.push(snapshot);
        self.save_snapshots(&snapshots)?;
        debug!(count = snapshots.len(), "Snapshot appended");
        Ok(snapshots.len())
    }

    /// Erase every snapshot; `false` if the sequence is not empty afterwards
    fn clear_snapshots(&self) -> StoreResult<bool> {
        self.save_snapshots(&[])?;
        let verified = self.load_snapshots()?.is_empty();
        log_verification("snapshots", verified);
        Ok(verified)
    }
}

impl<S: Store + ?Sized> VerifiedStore for S {}

fn update_settings<S, F>(store: &S, mutate: F) -> StoreResult<bool>
where
    S: Store + ?Sized,
    F: FnOnce(&mut SessionSettings),
{
    let mut settings = store.load_settings()?;
    mutate(&mut settings);
    store.save_settings(&settings)?;

    let verified = store.load_settings()? == settings;
    log_verification("settings", verified);
    Ok(verified)
}

fn log_verification(record: &str, verified: bool) {
    if verified {
        debug!(record, "Write verified");
    } else {
        warn!(record, "Write did not verify");
    }
}
