//! Session engine

use chrono::{DateTime, Local};
use rollcall_api::{
    AttendanceReport, AutoClearEvent, SessionEndReason, SessionSettings, SessionState, Snapshot,
    StatusView, MAX_SNAPSHOT_INTERVAL_SECS, MIN_SNAPSHOT_INTERVAL_SECS,
};
use rollcall_host_api::HostResult;
use rollcall_store::{Store, StoreResult, VerifiedStore};
use rollcall_util::{ChannelId, ParticipantId, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    aggregate, approximate_start, contains_instructor, participants_observed, AuthorizationGate,
    CoreError, CoreEvent, CoreResult, SessionRuntime, StopProgress, TickStart, TickTicket,
};

/// A session that was just started
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStart {
    pub session_id: SessionId,
    pub channel: ChannelId,
    pub interval: Duration,
    /// Outcome of the new-session auto-clear, when it ran
    pub auto_cleared: Option<bool>,
}

impl SessionStart {
    pub fn event(&self) -> CoreEvent {
        CoreEvent::SessionStarted {
            session_id: self.session_id,
            channel: self.channel,
            interval: self.interval,
        }
    }
}

/// The attendance session engine.
///
/// Owns the session runtime state; every persisted value is read from the
/// store on demand.
pub struct SessionEngine {
    store: Arc<dyn Store>,
    gate: AuthorizationGate,
    runtime: SessionRuntime,
}

impl SessionEngine {
    pub fn new(owner: ParticipantId, store: Arc<dyn Store>) -> Self {
        info!(owner = %owner, "Session engine initialized");

        Self {
            gate: AuthorizationGate::new(owner, store.clone()),
            store,
            runtime: SessionRuntime::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.runtime.state()
    }

    /// Sampling interval of the current session, if any
    pub fn sampling_interval(&self) -> Option<Duration> {
        self.runtime.active().map(|s| s.interval)
    }

    pub fn is_authorized(&self, actor: ParticipantId) -> bool {
        self.gate.is_authorized(actor)
    }

    fn require_authorized(&self, actor: ParticipantId) -> CoreResult<()> {
        if self.gate.is_authorized(actor) {
            Ok(())
        } else {
            debug!(actor = %actor, "Unauthorized command rejected");
            Err(CoreError::NotAuthorized)
        }
    }

    fn require_idle_session(&self) -> CoreResult<()> {
        if self.runtime.state().is_active() {
            Err(CoreError::SessionActive)
        } else {
            Ok(())
        }
    }

    // Session lifecycle

    /// Start sampling `channel`.
    ///
    /// `live_members` is the channel's current participant list; at least one
    /// of them must be a registered instructor.
    pub fn start_session(
        &mut self,
        actor: ParticipantId,
        channel: ChannelId,
        live_members: &[ParticipantId],
        now: DateTime<Local>,
    ) -> CoreResult<SessionStart> {
        self.require_authorized(actor)?;
        self.runtime.ensure_idle()?;

        let instructors = self.store.load_instructors()?;
        if !contains_instructor(live_members, &instructors) {
            return Err(CoreError::NoInstructorPresent(channel));
        }

        let settings = self.store.load_settings()?;

        let auto_cleared = if settings.auto_clear(AutoClearEvent::NewSession) {
            let cleared = self.store.clear_snapshots()?;
            if !cleared {
                warn!("Snapshots could not be cleared for the new session");
            }
            Some(cleared)
        } else {
            None
        };

        let interval = Duration::from_secs(settings.snapshot_interval_seconds);
        let session = self.runtime.begin(channel, interval, now)?;

        info!(
            session_id = %session.session_id,
            channel = %channel,
            actor = %actor,
            interval_secs = interval.as_secs(),
            "Session started"
        );

        Ok(SessionStart {
            session_id: session.session_id,
            channel,
            interval,
            auto_cleared,
        })
    }

    /// Ask the sampler to stop after any in-flight tick
    pub fn stop_session(&mut self, actor: ParticipantId) -> CoreResult<StopProgress> {
        self.require_authorized(actor)?;

        let progress = self.runtime.request_stop(SessionEndReason::Stopped)?;
        match &progress {
            StopProgress::Pending => {
                info!(actor = %actor, "Stop requested, waiting for in-flight tick");
            }
            StopProgress::Ended(summary) => {
                info!(
                    session_id = %summary.session_id,
                    actor = %actor,
                    ticks = summary.ticks,
                    "Session stopped"
                );
            }
        }
        Ok(progress)
    }

    /// Fire the sampler timer
    pub fn begin_tick(&mut self) -> TickStart {
        let start = self.runtime.begin_tick();
        match &start {
            TickStart::Sample(ticket) => {
                debug!(session_id = %ticket.session_id, tick = ticket.tick, "Sampling presence");
            }
            TickStart::Cancelled(summary) => {
                info!(
                    session_id = %summary.session_id,
                    reason = ?summary.reason,
                    ticks = summary.ticks,
                    "Session ended"
                );
            }
            TickStart::Busy => debug!("Previous tick still in flight"),
            TickStart::Idle => {}
        }
        start
    }

    /// Record the membership resolved for `ticket`.
    ///
    /// The snapshot is always written before any resulting cancellation takes
    /// the session to Idle.
    pub fn complete_tick(
        &mut self,
        ticket: &TickTicket,
        membership: HostResult<Vec<ParticipantId>>,
    ) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        let Some(session) = self.runtime.settle_tick(ticket) else {
            debug!(session_id = %ticket.session_id, tick = ticket.tick, "Discarding stale tick");
            return events;
        };

        match membership {
            Err(e) => {
                warn!(
                    session_id = %ticket.session_id,
                    tick = ticket.tick,
                    channel = %ticket.channel,
                    error = %e,
                    "Channel unresolvable, skipping tick"
                );
            }
            Ok(members) => {
                let snapshot = Snapshot::new(members);

                match self.gate.any_instructor(snapshot.members()) {
                    Some(true) => {}
                    Some(false) => {
                        if !session.is_cancelled() {
                            info!(
                                session_id = %ticket.session_id,
                                channel = %ticket.channel,
                                "No instructor left in channel, stopping session"
                            );
                            session.request_cancel(SessionEndReason::InstructorLeft);
                            events.push(CoreEvent::InstructorLeft {
                                session_id: ticket.session_id,
                                channel: ticket.channel,
                            });
                        }
                    }
                    None => {
                        warn!(
                            session_id = %ticket.session_id,
                            "Instructor registry unreadable, keeping session alive"
                        );
                    }
                }

                let members = snapshot.members().len();
                match self.store.append_snapshot(snapshot) {
                    Ok(total) => {
                        session.snapshots_recorded += 1;
                        debug!(
                            session_id = %ticket.session_id,
                            tick = ticket.tick,
                            members,
                            total,
                            "Snapshot recorded"
                        );
                        events.push(CoreEvent::SnapshotRecorded {
                            session_id: ticket.session_id,
                            tick: ticket.tick,
                            members,
                        });
                    }
                    Err(e) => {
                        warn!(
                            session_id = %ticket.session_id,
                            tick = ticket.tick,
                            error = %e,
                            "Failed to record snapshot"
                        );
                        events.push(CoreEvent::SnapshotWriteFailed {
                            session_id: ticket.session_id,
                            tick: ticket.tick,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        if let Some(summary) = self.runtime.finish_if_cancelled() {
            info!(
                session_id = %summary.session_id,
                reason = ?summary.reason,
                ticks = summary.ticks,
                snapshots = summary.snapshots_recorded,
                "Session ended"
            );
            events.push((&summary).into());
        }

        events
    }

    /// Force Idle; an in-flight tick's result will be discarded
    pub fn shutdown(&mut self) -> Option<CoreEvent> {
        let summary = self.runtime.force_idle()?;
        info!(
            session_id = %summary.session_id,
            ticks = summary.ticks,
            "Session abandoned at shutdown"
        );
        Some((&summary).into())
    }

    // Reporting

    /// Aggregate the recorded snapshots
    pub fn report(&self, actor: ParticipantId, now: DateTime<Local>) -> CoreResult<AttendanceReport> {
        self.require_authorized(actor)?;
        self.require_idle_session()?;

        let snapshots = self.store.load_snapshots()?;
        let instructors = self.store.load_instructors()?;
        let settings = self.store.load_settings()?;

        let result = aggregate(&snapshots, &instructors, settings.minimum_attendance_rate)
            .ok_or(CoreError::NoData)?;

        let auto_cleared = if settings.auto_clear(AutoClearEvent::AfterReport) {
            Some(self.store.clear_snapshots()?)
        } else {
            None
        };

        info!(
            actor = %actor,
            snapshots = result.total_snapshots,
            participants = result.verdicts.len(),
            auto_cleared = ?auto_cleared,
            "Attendance report generated"
        );

        Ok(AttendanceReport {
            total_snapshots: result.total_snapshots,
            approximate_start: approximate_start(
                now,
                result.total_snapshots,
                settings.snapshot_interval_seconds,
            ),
            generated_at: now,
            minimum_attendance_rate: settings.minimum_attendance_rate,
            instructors_present: result.instructors_present,
            verdicts: result.verdicts,
            auto_cleared,
        })
    }

    /// Erase every recorded snapshot; allowed while a session runs
    pub fn clear_snapshots(&self, actor: ParticipantId) -> CoreResult<()> {
        self.require_authorized(actor)?;

        if !self.store.clear_snapshots()? {
            return Err(CoreError::WriteNotVerified("snapshot"));
        }
        info!(actor = %actor, "Snapshots cleared");
        Ok(())
    }

    pub fn status(&self) -> CoreResult<StatusView> {
        let snapshots = self.store.load_snapshots()?;
        let active = self.runtime.active();

        Ok(StatusView {
            state: self.runtime.state(),
            session_id: active.map(|s| s.session_id),
            channel: active.and_then(|s| s.channel),
            started_at: active.map(|s| s.started_at),
            snapshot_interval_seconds: active.map(|s| s.interval.as_secs()),
            snapshots_recorded: snapshots.len(),
            participants_observed: participants_observed(&snapshots),
        })
    }

    // Instructor registry

    pub fn list_instructors(&self, actor: ParticipantId) -> CoreResult<Vec<ParticipantId>> {
        self.require_authorized(actor)?;
        Ok(self.store.load_instructors()?)
    }

    pub fn add_instructor(&self, actor: ParticipantId, member: ParticipantId) -> CoreResult<()> {
        self.require_authorized(actor)?;

        if self.store.load_instructors()?.contains(&member) {
            return Err(CoreError::InstructorExists(member));
        }
        if !self.store.add_instructor(member)? {
            return Err(CoreError::WriteNotVerified("instructor"));
        }

        info!(actor = %actor, member = %member, "Instructor added");
        Ok(())
    }

    pub fn remove_instructor(&self, actor: ParticipantId, member: ParticipantId) -> CoreResult<()> {
        self.require_authorized(actor)?;

        if !self.store.load_instructors()?.contains(&member) {
            return Err(CoreError::InstructorNotFound(member));
        }
        if !self.store.remove_instructor(member)? {
            return Err(CoreError::WriteNotVerified("instructor"));
        }

        info!(actor = %actor, member = %member, "Instructor removed");
        Ok(())
    }

    // Settings

    pub fn settings(&self, actor: ParticipantId) -> CoreResult<SessionSettings> {
        self.require_authorized(actor)?;
        Ok(self.store.load_settings()?)
    }

    pub fn set_minimum_attendance_rate(
        &self,
        actor: ParticipantId,
        rate: f64,
    ) -> CoreResult<SessionSettings> {
        self.update_setting(actor, "minimum attendance", |store| {
            if !SessionSettings::is_valid_rate(rate) {
                return Ok(Err(CoreError::InvalidSetting(format!(
                    "Minimum attendance must be between 0 and 1, got {rate}"
                ))));
            }
            store.set_minimum_attendance_rate(rate).map(Ok)
        })
    }

    pub fn set_snapshot_interval(
        &self,
        actor: ParticipantId,
        seconds: u64,
    ) -> CoreResult<SessionSettings> {
        self.update_setting(actor, "snapshot interval", |store| {
            if !SessionSettings::is_valid_interval(seconds) {
                return Ok(Err(CoreError::InvalidSetting(format!(
                    "Snapshot interval must be between {MIN_SNAPSHOT_INTERVAL_SECS} and \
                     {MAX_SNAPSHOT_INTERVAL_SECS} seconds, got {seconds}"
                ))));
            }
            store.set_snapshot_interval(seconds).map(Ok)
        })
    }

    pub fn set_auto_clear(
        &self,
        actor: ParticipantId,
        event: AutoClearEvent,
        enabled: bool,
    ) -> CoreResult<SessionSettings> {
        self.update_setting(actor, "auto-clear", |store| {
            store.set_auto_clear(event, enabled).map(Ok)
        })
    }

    pub fn set_responses_ephemeral(
        &self,
        actor: ParticipantId,
        enabled: bool,
    ) -> CoreResult<SessionSettings> {
        self.update_setting(actor, "ephemeral responses", |store| {
            store.set_responses_ephemeral(enabled).map(Ok)
        })
    }

    /// Authorize, lock out active sessions, then run a verified write.
    ///
    /// `write` returns the verification flag, or a rejection from validating
    /// its input before anything was written.
    fn update_setting<F>(
        &self,
        actor: ParticipantId,
        name: &'static str,
        write: F,
    ) -> CoreResult<SessionSettings>
    where
        F: FnOnce(&dyn Store) -> StoreResult<CoreResult<bool>>,
    {
        self.require_authorized(actor)?;
        self.require_idle_session()?;

        if !write(self.store.as_ref())?? {
            return Err(CoreError::WriteNotVerified(name));
        }

        let settings = self.store.load_settings()?;
        info!(actor = %actor, setting = name, "Setting updated");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_host_api::HostError;
    use rollcall_store::{SqliteStore, StoreError};
    use std::sync::atomic::{AtomicBool, Ordering};

    const OWNER: ParticipantId = ParticipantId::new(1);
    const INSTRUCTOR: ParticipantId = ParticipantId::new(2);
    const VC: ChannelId = ChannelId::new(100);

    fn p(id: u64) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn store() -> Arc<SqliteStore> {
        let store = SqliteStore::in_memory().unwrap();
        store
            .prepare_for_startup(&SessionSettings::default(), &[INSTRUCTOR])
            .unwrap();
        Arc::new(store)
    }

    fn engine() -> SessionEngine {
        SessionEngine::new(OWNER, store())
    }

    fn started() -> SessionEngine {
        let mut engine = engine();
        engine
            .start_session(INSTRUCTOR, VC, &[INSTRUCTOR, p(10)], Local::now())
            .unwrap();
        engine
    }

    fn ticket(engine: &mut SessionEngine) -> TickTicket {
        match engine.begin_tick() {
            TickStart::Sample(ticket) => ticket,
            other => panic!("expected a sample, got {other:?}"),
        }
    }

    fn sample(engine: &mut SessionEngine, members: &[u64]) -> Vec<CoreEvent> {
        let ticket = ticket(engine);
        engine.complete_tick(&ticket, Ok(members.iter().copied().map(p).collect()))
    }

    /// In-memory store with switchable faults
    #[derive(Default)]
    struct Faults {
        /// `save_snapshots` errors
        snapshot_writes: AtomicBool,
        /// Every `save_*` succeeds without storing anything
        dropped_writes: AtomicBool,
        /// `load_instructors` errors
        registry_reads: AtomicBool,
    }

    struct FaultyStore {
        inner: SqliteStore,
        faults: Faults,
    }

    impl FaultyStore {
        fn seeded() -> Arc<Self> {
            let store = Self {
                inner: SqliteStore::in_memory().unwrap(),
                faults: Faults::default(),
            };
            store
                .prepare_for_startup(&SessionSettings::default(), &[INSTRUCTOR])
                .unwrap();
            Arc::new(store)
        }

        fn set(flag: &AtomicBool, on: bool) {
            flag.store(on, Ordering::SeqCst);
        }

        fn drops_writes(&self) -> bool {
            self.faults.dropped_writes.load(Ordering::SeqCst)
        }
    }

    impl Store for FaultyStore {
        fn load_instructors(&self) -> StoreResult<Vec<ParticipantId>> {
            if self.faults.registry_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Database("registry unreadable".into()));
            }
            self.inner.load_instructors()
        }
        fn save_instructors(&self, instructors: &[ParticipantId]) -> StoreResult<()> {
            if self.drops_writes() {
                return Ok(());
            }
            self.inner.save_instructors(instructors)
        }
        fn load_settings(&self) -> StoreResult<SessionSettings> {
            self.inner.load_settings()
        }
        fn save_settings(&self, settings: &SessionSettings) -> StoreResult<()> {
            if self.drops_writes() {
                return Ok(());
            }
            self.inner.save_settings(settings)
        }
        fn load_snapshots(&self) -> StoreResult<Vec<Snapshot>> {
            self.inner.load_snapshots()
        }
        fn save_snapshots(&self, snapshots: &[Snapshot]) -> StoreResult<()> {
            if self.faults.snapshot_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Database("disk full".into()));
            }
            if self.drops_writes() {
                return Ok(());
            }
            self.inner.save_snapshots(snapshots)
        }
        fn prepare_for_startup(
            &self,
            defaults: &SessionSettings,
            seed_instructors: &[ParticipantId],
        ) -> StoreResult<()> {
            self.inner.prepare_for_startup(defaults, seed_instructors)
        }
        fn is_healthy(&self) -> bool {
            true
        }
    }

    #[test]
    fn start_requires_authorization() {
        let mut engine = engine();
        let err = engine
            .start_session(p(10), VC, &[INSTRUCTOR], Local::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotAuthorized));
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn start_requires_instructor_in_channel() {
        let mut engine = engine();

        // The owner alone is not an instructor
        let err = engine
            .start_session(OWNER, VC, &[OWNER, p(10)], Local::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NoInstructorPresent(c) if c == VC));
        assert_eq!(engine.state(), SessionState::Idle);

        let start = engine
            .start_session(OWNER, VC, &[OWNER, INSTRUCTOR], Local::now())
            .unwrap();
        assert_eq!(start.channel, VC);
        assert_eq!(start.interval, Duration::from_secs(3));
        assert_eq!(start.auto_cleared, None);
        assert_eq!(engine.state(), SessionState::Running);
        assert_eq!(engine.sampling_interval(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn start_while_running_is_rejected() {
        let mut engine = started();
        let err = engine
            .start_session(INSTRUCTOR, ChannelId::new(200), &[INSTRUCTOR], Local::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyRunning(c) if c == VC));
        assert_eq!(engine.status().unwrap().channel, Some(VC));
    }

    #[test]
    fn start_uses_configured_interval_and_auto_clear() {
        let store = store();
        store.set_snapshot_interval(30).unwrap();
        store.set_auto_clear(AutoClearEvent::NewSession, true).unwrap();
        store.append_snapshot(Snapshot::new([p(5)])).unwrap();

        let mut engine = SessionEngine::new(OWNER, store.clone());
        let start = engine
            .start_session(INSTRUCTOR, VC, &[INSTRUCTOR], Local::now())
            .unwrap();

        assert_eq!(start.interval, Duration::from_secs(30));
        assert_eq!(start.auto_cleared, Some(true));
        assert!(store.load_snapshots().unwrap().is_empty());
    }

    #[test]
    fn ticks_record_snapshots() {
        let mut engine = started();

        let events = sample(&mut engine, &[2, 10, 11]);
        assert!(matches!(
            events.as_slice(),
            [CoreEvent::SnapshotRecorded { tick: 1, members: 3, .. }]
        ));

        sample(&mut engine, &[2, 10]);
        let status = engine.status().unwrap();
        assert_eq!(status.snapshots_recorded, 2);
        assert_eq!(status.participants_observed, 3);
        assert_eq!(status.state, SessionState::Running);
        assert!(status.started_at.is_some());

        engine.stop_session(INSTRUCTOR).unwrap();
        assert_eq!(engine.status().unwrap().started_at, None);
    }

    #[test]
    fn instructor_loss_records_then_ends() {
        let mut engine = started();
        sample(&mut engine, &[2, 10]);

        let events = sample(&mut engine, &[10]);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], CoreEvent::InstructorLeft { channel, .. } if channel == VC));
        assert!(matches!(events[1], CoreEvent::SnapshotRecorded { tick: 2, members: 1, .. }));
        assert!(matches!(
            events[2],
            CoreEvent::SessionEnded { reason: SessionEndReason::InstructorLeft, ticks: 2, .. }
        ));

        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.status().unwrap().snapshots_recorded, 2);
    }

    #[test]
    fn stop_waits_for_in_flight_tick() {
        let mut engine = started();
        let ticket = ticket(&mut engine);

        assert_eq!(engine.stop_session(INSTRUCTOR).unwrap(), StopProgress::Pending);
        assert_eq!(engine.state(), SessionState::Cancelling);
        assert!(matches!(
            engine.stop_session(INSTRUCTOR),
            Err(CoreError::AlreadyStopping)
        ));
        assert!(matches!(
            engine.start_session(INSTRUCTOR, VC, &[INSTRUCTOR], Local::now()),
            Err(CoreError::AlreadyStopping)
        ));

        let events = engine.complete_tick(&ticket, Ok(vec![INSTRUCTOR, p(10)]));
        assert!(matches!(events[0], CoreEvent::SnapshotRecorded { .. }));
        assert!(matches!(
            events[1],
            CoreEvent::SessionEnded { reason: SessionEndReason::Stopped, ticks: 1, .. }
        ));
        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(engine.status().unwrap().snapshots_recorded, 1);
    }

    #[test]
    fn stop_when_idle() {
        let mut engine = engine();
        assert!(matches!(engine.stop_session(INSTRUCTOR), Err(CoreError::NothingToStop)));
        assert!(matches!(engine.stop_session(p(10)), Err(CoreError::NotAuthorized)));
    }

    #[test]
    fn unresolvable_channel_skips_tick() {
        let mut engine = started();
        let ticket = ticket(&mut engine);

        let events = engine.complete_tick(&ticket, Err(HostError::ChannelNotFound(VC)));
        assert!(events.is_empty());
        assert_eq!(engine.state(), SessionState::Running);
        assert_eq!(engine.status().unwrap().snapshots_recorded, 0);

        // The sampler keeps going
        let events = sample(&mut engine, &[2]);
        assert!(matches!(events[0], CoreEvent::SnapshotRecorded { tick: 2, .. }));
    }

    #[test]
    fn write_failure_keeps_sampling() {
        let store = FaultyStore::seeded();
        let mut engine = SessionEngine::new(OWNER, store.clone());
        engine
            .start_session(INSTRUCTOR, VC, &[INSTRUCTOR], Local::now())
            .unwrap();

        FaultyStore::set(&store.faults.snapshot_writes, true);
        let events = sample(&mut engine, &[2]);
        assert!(matches!(events[0], CoreEvent::SnapshotWriteFailed { tick: 1, .. }));
        assert_eq!(engine.state(), SessionState::Running);

        FaultyStore::set(&store.faults.snapshot_writes, false);
        let events = sample(&mut engine, &[2]);
        assert!(matches!(events[0], CoreEvent::SnapshotRecorded { tick: 2, .. }));
    }

    #[test]
    fn unconfirmed_writes_ask_to_retry() {
        let store = FaultyStore::seeded();
        store.append_snapshot(Snapshot::new([p(10)])).unwrap();
        let engine = SessionEngine::new(OWNER, store.clone());

        FaultyStore::set(&store.faults.dropped_writes, true);

        assert!(matches!(
            engine.set_minimum_attendance_rate(OWNER, 0.9),
            Err(CoreError::WriteNotVerified("minimum attendance"))
        ));
        assert!(matches!(
            engine.set_snapshot_interval(OWNER, 60),
            Err(CoreError::WriteNotVerified("snapshot interval"))
        ));
        assert!(matches!(
            engine.add_instructor(OWNER, p(3)),
            Err(CoreError::WriteNotVerified("instructor"))
        ));
        assert!(matches!(
            engine.remove_instructor(OWNER, INSTRUCTOR),
            Err(CoreError::WriteNotVerified("instructor"))
        ));
        assert!(matches!(
            engine.clear_snapshots(OWNER),
            Err(CoreError::WriteNotVerified("snapshot"))
        ));
        assert_eq!(
            CoreError::WriteNotVerified("snapshot").code(),
            rollcall_api::ErrorCode::WriteNotVerified
        );

        // Nothing changed underneath
        assert_eq!(engine.settings(OWNER).unwrap(), SessionSettings::default());
        assert_eq!(engine.list_instructors(OWNER).unwrap(), vec![INSTRUCTOR]);
        assert_eq!(engine.status().unwrap().snapshots_recorded, 1);
    }

    #[test]
    fn auto_clear_reports_unconfirmed_clear() {
        let store = FaultyStore::seeded();
        store.set_auto_clear(AutoClearEvent::NewSession, true).unwrap();
        store.set_auto_clear(AutoClearEvent::AfterReport, true).unwrap();
        store.append_snapshot(Snapshot::new([p(10)])).unwrap();
        let mut engine = SessionEngine::new(OWNER, store.clone());

        FaultyStore::set(&store.faults.dropped_writes, true);

        let start = engine
            .start_session(INSTRUCTOR, VC, &[INSTRUCTOR], Local::now())
            .unwrap();
        assert_eq!(start.auto_cleared, Some(false));
        assert_eq!(engine.state(), SessionState::Running);
        engine.stop_session(INSTRUCTOR).unwrap();

        let report = engine.report(INSTRUCTOR, Local::now()).unwrap();
        assert_eq!(report.auto_cleared, Some(false));
        assert_eq!(report.total_snapshots, 1);
        assert_eq!(store.load_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn unreadable_registry_at_start_is_a_store_fault() {
        let store = FaultyStore::seeded();
        let mut engine = SessionEngine::new(OWNER, store.clone());

        FaultyStore::set(&store.faults.registry_reads, true);

        // The owner passes the gate without a registry lookup
        let err = engine
            .start_session(OWNER, VC, &[INSTRUCTOR], Local::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::Store(_)));
        assert!(err.is_fault());
        assert_eq!(engine.state(), SessionState::Idle);

        FaultyStore::set(&store.faults.registry_reads, false);
        assert!(engine
            .start_session(OWNER, VC, &[INSTRUCTOR], Local::now())
            .is_ok());
    }

    #[test]
    fn shutdown_discards_in_flight_tick() {
        let mut engine = started();
        let ticket = ticket(&mut engine);

        assert!(matches!(
            engine.shutdown(),
            Some(CoreEvent::SessionEnded { reason: SessionEndReason::Shutdown, .. })
        ));
        assert!(engine.complete_tick(&ticket, Ok(vec![INSTRUCTOR])).is_empty());
        assert_eq!(engine.status().unwrap().snapshots_recorded, 0);
        assert!(engine.shutdown().is_none());
    }

    #[test]
    fn report_rules() {
        let mut engine = started();
        sample(&mut engine, &[2]);

        assert!(matches!(
            engine.report(INSTRUCTOR, Local::now()),
            Err(CoreError::SessionActive)
        ));
        assert!(matches!(engine.report(p(10), Local::now()), Err(CoreError::NotAuthorized)));

        engine.stop_session(INSTRUCTOR).unwrap();
        engine.clear_snapshots(INSTRUCTOR).unwrap();
        assert!(matches!(engine.report(INSTRUCTOR, Local::now()), Err(CoreError::NoData)));
    }

    #[test]
    fn report_aggregates_and_excludes_instructors() {
        let store = store();
        store.save_instructors(&[p(1)]).unwrap();
        for ids in [&[1u64, 2][..], &[1], &[1, 2, 3]] {
            store
                .append_snapshot(Snapshot::new(ids.iter().copied().map(p)))
                .unwrap();
        }
        let engine = SessionEngine::new(OWNER, store.clone());

        let now = Local::now();
        let report = engine.report(OWNER, now).unwrap();

        assert_eq!(report.total_snapshots, 3);
        assert_eq!(report.instructors_present, vec![p(1)]);
        let attended: Vec<_> = report.attended().map(|v| v.participant).collect();
        let absent: Vec<_> = report.absent().map(|v| v.participant).collect();
        assert_eq!(attended, vec![p(2)]);
        assert_eq!(absent, vec![p(3)]);
        assert_eq!(report.approximate_start, now - chrono::TimeDelta::seconds(9));
        assert_eq!(report.auto_cleared, None);

        // Reporting does not consume snapshots unless asked to
        assert_eq!(store.load_snapshots().unwrap().len(), 3);
    }

    #[test]
    fn report_auto_clear() {
        let store = store();
        store.set_auto_clear(AutoClearEvent::AfterReport, true).unwrap();
        store.append_snapshot(Snapshot::new([p(7)])).unwrap();
        let engine = SessionEngine::new(OWNER, store.clone());

        let report = engine.report(OWNER, Local::now()).unwrap();
        assert_eq!(report.auto_cleared, Some(true));
        assert!(store.load_snapshots().unwrap().is_empty());
        assert!(matches!(engine.report(OWNER, Local::now()), Err(CoreError::NoData)));
    }

    #[test]
    fn clear_is_allowed_while_running() {
        let mut engine = started();
        sample(&mut engine, &[2, 10]);

        engine.clear_snapshots(INSTRUCTOR).unwrap();
        assert_eq!(engine.status().unwrap().snapshots_recorded, 0);
        assert_eq!(engine.state(), SessionState::Running);
    }

    #[test]
    fn instructor_registry_commands() {
        let engine = engine();

        assert!(matches!(
            engine.add_instructor(p(10), p(10)),
            Err(CoreError::NotAuthorized)
        ));

        engine.add_instructor(OWNER, p(3)).unwrap();
        assert!(engine.is_authorized(p(3)));
        assert!(matches!(
            engine.add_instructor(OWNER, p(3)),
            Err(CoreError::InstructorExists(id)) if id == p(3)
        ));

        engine.remove_instructor(p(3), p(3)).unwrap();
        assert!(!engine.is_authorized(p(3)));
        assert!(matches!(
            engine.remove_instructor(OWNER, p(3)),
            Err(CoreError::InstructorNotFound(_))
        ));

        assert_eq!(engine.list_instructors(OWNER).unwrap(), vec![INSTRUCTOR]);
    }

    #[test]
    fn authorization_is_restored_after_add_remove() {
        let engine = engine();
        let before: Vec<bool> = (1..=5).map(|id| engine.is_authorized(p(id))).collect();

        engine.add_instructor(OWNER, p(4)).unwrap();
        engine.remove_instructor(OWNER, p(4)).unwrap();

        let after: Vec<bool> = (1..=5).map(|id| engine.is_authorized(p(id))).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn settings_are_validated() {
        let engine = engine();

        assert!(matches!(
            engine.set_minimum_attendance_rate(OWNER, 1.5),
            Err(CoreError::InvalidSetting(_))
        ));
        assert!(matches!(
            engine.set_snapshot_interval(OWNER, 2),
            Err(CoreError::InvalidSetting(_))
        ));
        assert!(matches!(
            engine.set_snapshot_interval(OWNER, 901),
            Err(CoreError::InvalidSetting(_))
        ));
        assert_eq!(engine.settings(OWNER).unwrap(), SessionSettings::default());
    }

    #[test]
    fn settings_round_trip() {
        let engine = engine();

        let rate = 2.0 / 3.0;
        let settings = engine.set_minimum_attendance_rate(INSTRUCTOR, rate).unwrap();
        assert_eq!(settings.minimum_attendance_rate, rate);
        assert_eq!(engine.settings(INSTRUCTOR).unwrap().minimum_attendance_rate, rate);

        let settings = engine.set_snapshot_interval(INSTRUCTOR, 900).unwrap();
        assert_eq!(settings.snapshot_interval_seconds, 900);

        let settings = engine
            .set_auto_clear(INSTRUCTOR, AutoClearEvent::NewSession, true)
            .unwrap();
        assert!(settings.auto_clear_on_new_session);

        let settings = engine.set_responses_ephemeral(INSTRUCTOR, false).unwrap();
        assert!(!settings.responses_are_ephemeral);
    }

    #[test]
    fn settings_locked_while_session_active() {
        let mut engine = started();
        assert!(matches!(
            engine.set_snapshot_interval(INSTRUCTOR, 60),
            Err(CoreError::SessionActive)
        ));

        let _in_flight = ticket(&mut engine);
        engine.stop_session(INSTRUCTOR).unwrap();
        assert!(matches!(
            engine.set_minimum_attendance_rate(INSTRUCTOR, 0.9),
            Err(CoreError::SessionActive)
        ));

        // Reading is fine
        assert!(engine.settings(INSTRUCTOR).is_ok());
    }
}
