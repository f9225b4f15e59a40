//! Configuration validation

use crate::schema::RawConfig;
use rollcall_api::SessionSettings;
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("owner_id must be a non-zero participant id")]
    MissingOwner,

    #[error("defaults.minimum_attendance_rate {0} is outside 0.0..=1.0")]
    RateOutOfRange(f64),

    #[error("defaults.snapshot_interval_seconds {0} is outside 3..=900")]
    IntervalOutOfRange(u64),

    #[error("Duplicate seed instructor: {0}")]
    DuplicateInstructor(u64),

    #[error("Seed instructor id must be non-zero")]
    ZeroInstructor,
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.owner_id == 0 {
        errors.push(ValidationError::MissingOwner);
    }

    if let Some(rate) = config.defaults.minimum_attendance_rate
        && !SessionSettings::is_valid_rate(rate)
    {
        errors.push(ValidationError::RateOutOfRange(rate));
    }

    if let Some(seconds) = config.defaults.snapshot_interval_seconds
        && !SessionSettings::is_valid_interval(seconds)
    {
        errors.push(ValidationError::IntervalOutOfRange(seconds));
    }

    let mut seen = HashSet::new();
    for &id in &config.seed_instructors {
        if id == 0 {
            errors.push(ValidationError::ZeroInstructor);
        } else if !seen.insert(id) {
            errors.push(ValidationError::DuplicateInstructor(id));
        }
    }

    errors
}
