//! Validated configuration structures

use crate::schema::{RawConfig, RawDefaults};
use rollcall_api::SessionSettings;
use rollcall_util::ParticipantId;
use std::path::PathBuf;

/// Validated configuration ready for use by the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Always passes the authorization gate
    pub owner: ParticipantId,

    /// Directory holding the store
    pub data_dir: PathBuf,

    /// Settings written to the store on first run
    pub defaults: SessionSettings,

    /// Instructors written to the store on first run
    pub seed_instructors: Vec<ParticipantId>,
}

impl ServiceConfig {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            owner: ParticipantId::new(raw.owner_id),
            data_dir: raw
                .service
                .data_dir
                .unwrap_or_else(rollcall_util::default_data_dir),
            defaults: settings_from_raw(&raw.defaults),
            seed_instructors: raw
                .seed_instructors
                .into_iter()
                .map(ParticipantId::new)
                .collect(),
        }
    }
}

fn settings_from_raw(raw: &RawDefaults) -> SessionSettings {
    let builtin = SessionSettings::default();
    SessionSettings {
        minimum_attendance_rate: raw
            .minimum_attendance_rate
            .unwrap_or(builtin.minimum_attendance_rate),
        snapshot_interval_seconds: raw
            .snapshot_interval_seconds
            .unwrap_or(builtin.snapshot_interval_seconds),
        auto_clear_on_new_session: raw
            .auto_clear_on_new_session
            .unwrap_or(builtin.auto_clear_on_new_session),
        auto_clear_after_report: raw
            .auto_clear_after_report
            .unwrap_or(builtin.auto_clear_after_report),
        responses_are_ephemeral: raw
            .responses_are_ephemeral
            .unwrap_or(builtin.responses_are_ephemeral),
    }
}
