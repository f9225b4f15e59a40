//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Participant id of the bot owner; always authorized
    pub owner_id: u64,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// First-run values for the persisted session settings
    #[serde(default)]
    pub defaults: RawDefaults,

    /// Participants registered as instructors on first run
    #[serde(default)]
    pub seed_instructors: Vec<u64>,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// Data directory for the store
    pub data_dir: Option<PathBuf>,
}

/// Session setting defaults; anything unset falls back to the built-in value
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    pub minimum_attendance_rate: Option<f64>,
    pub snapshot_interval_seconds: Option<u64>,
    pub auto_clear_on_new_session: Option<bool>,
    pub auto_clear_after_report: Option<bool>,
    pub responses_are_ephemeral: Option<bool>,
}
