//! Engine rejections and faults

use rollcall_api::ErrorCode;
use rollcall_store::StoreError;
use rollcall_util::{ChannelId, ParticipantId};
use thiserror::Error;

/// Why the engine refused or failed an operation.
///
/// Everything except [`CoreError::Store`] is an ordinary rejection that leaves
/// state untouched; a store fault is reported to the caller as-is.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Sorry, you have to be an instructor to use this command")]
    NotAuthorized,

    #[error("A session is already running in {}", .0.mention())]
    AlreadyRunning(ChannelId),

    #[error("The current session is already being stopped, please wait for it to finish")]
    AlreadyStopping,

    #[error("A session is not currently running, so there is nothing to stop")]
    NothingToStop,

    #[error("You or another instructor needs to be in {} to start a session", .0.mention())]
    NoInstructorPresent(ChannelId),

    #[error("Can't do that while a session is running; stop the current session first")]
    SessionActive,

    #[error("{0}")]
    InvalidSetting(String),

    #[error("{} is already an instructor", .0.mention())]
    InstructorExists(ParticipantId),

    #[error("{} is not an instructor", .0.mention())]
    InstructorNotFound(ParticipantId),

    #[error("The {0} change could not be confirmed, please try again")]
    WriteNotVerified(&'static str),

    #[error("No available snapshot data to report attendance with")]
    NoData,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Protocol error code for this rejection
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotAuthorized => ErrorCode::NotAuthorized,
            CoreError::AlreadyRunning(_) | CoreError::SessionActive => ErrorCode::SessionActive,
            CoreError::AlreadyStopping => ErrorCode::SessionStopping,
            CoreError::NothingToStop => ErrorCode::NoActiveSession,
            CoreError::NoInstructorPresent(_) => ErrorCode::NoInstructorPresent,
            CoreError::InvalidSetting(_) => ErrorCode::InvalidSetting,
            CoreError::InstructorExists(_) => ErrorCode::InstructorExists,
            CoreError::InstructorNotFound(_) => ErrorCode::InstructorNotFound,
            CoreError::WriteNotVerified(_) => ErrorCode::WriteNotVerified,
            CoreError::NoData => ErrorCode::NoData,
            CoreError::Store(_) => ErrorCode::StoreError,
        }
    }

    /// A store fault rather than a rejection
    pub fn is_fault(&self) -> bool {
        matches!(self, CoreError::Store(_))
    }
}
