//! Shared types for the rollcall API

use chrono::{DateTime, Local};
use rollcall_util::{ChannelId, ParticipantId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Smallest accepted snapshot interval, in seconds
pub const MIN_SNAPSHOT_INTERVAL_SECS: u64 = 3;

/// Largest accepted snapshot interval, in seconds
pub const MAX_SNAPSHOT_INTERVAL_SECS: u64 = 900;

pub const DEFAULT_MINIMUM_ATTENDANCE_RATE: f64 = 0.5;
pub const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 3;

/// Header row of an exported attendance CSV
pub const CSV_HEADERS: &str = "member_id,attended";

/// Persisted session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Fraction of snapshots a participant must appear in, in [0.0, 1.0]
    pub minimum_attendance_rate: f64,

    /// Seconds between presence snapshots
    pub snapshot_interval_seconds: u64,

    /// Erase recorded snapshots when a new session starts
    pub auto_clear_on_new_session: bool,

    /// Erase recorded snapshots once a report has been produced
    pub auto_clear_after_report: bool,

    /// Display hint for the front-end; the engine never reads it
    pub responses_are_ephemeral: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            minimum_attendance_rate: DEFAULT_MINIMUM_ATTENDANCE_RATE,
            snapshot_interval_seconds: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            auto_clear_on_new_session: false,
            auto_clear_after_report: false,
            responses_are_ephemeral: true,
        }
    }
}

impl SessionSettings {
    pub fn is_valid_rate(rate: f64) -> bool {
        rate.is_finite() && (0.0..=1.0).contains(&rate)
    }

    pub fn is_valid_interval(seconds: u64) -> bool {
        (MIN_SNAPSHOT_INTERVAL_SECS..=MAX_SNAPSHOT_INTERVAL_SECS).contains(&seconds)
    }

    /// Read one of the auto-clear flags
    pub fn auto_clear(&self, event: AutoClearEvent) -> bool {
        match event {
            AutoClearEvent::NewSession => self.auto_clear_on_new_session,
            AutoClearEvent::AfterReport => self.auto_clear_after_report,
        }
    }
}

/// Moments at which recorded snapshots may be erased automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoClearEvent {
    NewSession,
    AfterReport,
}

/// Participants observed in the target channel at one sampling tick.
///
/// Duplicates are dropped on construction; observation order is kept so that
/// reports can list participants in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<ParticipantId>);

impl Snapshot {
    pub fn new(members: impl IntoIterator<Item = ParticipantId>) -> Self {
        let mut seen = HashSet::new();
        Self(members.into_iter().filter(|id| seen.insert(*id)).collect())
    }

    pub fn members(&self) -> &[ParticipantId] {
        &self.0
    }
}

/// Run state of the presence sampler (and therefore of the session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    /// Stop requested; waiting for the in-flight tick to finish
    Cancelling,
}

impl SessionState {
    /// Running or Cancelling
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// An authorized actor stopped it
    Stopped,
    /// No instructor remained in the channel
    InstructorLeft,
    /// Service shutdown
    Shutdown,
}

/// Per-participant attendance outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantVerdict {
    pub participant: ParticipantId,
    /// Number of snapshots the participant appeared in
    pub attended_count: usize,
    pub attended: bool,
}

/// Aggregated attendance for the recorded snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub total_snapshots: usize,

    /// `now - total_snapshots * interval`; no per-snapshot timestamps exist
    pub approximate_start: DateTime<Local>,

    pub generated_at: DateTime<Local>,

    pub minimum_attendance_rate: f64,

    /// Instructors seen in any snapshot, in order of first appearance
    pub instructors_present: Vec<ParticipantId>,

    /// Non-instructor verdicts, in order of first appearance
    pub verdicts: Vec<ParticipantVerdict>,

    /// Outcome of the post-report auto-clear, when it ran
    pub auto_cleared: Option<bool>,
}

impl AttendanceReport {
    pub fn attended(&self) -> impl Iterator<Item = &ParticipantVerdict> {
        self.verdicts.iter().filter(|v| v.attended)
    }

    pub fn absent(&self) -> impl Iterator<Item = &ParticipantVerdict> {
        self.verdicts.iter().filter(|v| !v.attended)
    }

    /// Render the verdicts as CSV, one row per participant
    pub fn to_csv(&self) -> String {
        let mut csv = String::with_capacity(CSV_HEADERS.len() + 1 + self.verdicts.len() * 28);
        csv.push_str(CSV_HEADERS);
        csv.push('\n');
        for verdict in &self.verdicts {
            csv.push_str(&format!("{},{}\n", verdict.participant, verdict.attended));
        }
        csv
    }

    /// File name for a CSV export of this report
    pub fn csv_filename(&self) -> String {
        format!("attendance_export_{}.csv", self.generated_at.timestamp())
    }
}

/// Current engine status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    pub channel: Option<ChannelId>,
    pub started_at: Option<DateTime<Local>>,
    pub snapshot_interval_seconds: Option<u64>,
    pub snapshots_recorded: usize,
    /// Distinct participants seen across all recorded snapshots
    pub participants_observed: usize,
}
