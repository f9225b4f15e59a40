//! Command types for the rollcall protocol

use rollcall_util::{ChannelId, ParticipantId, SessionId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, AttendanceReport, AutoClearEvent, SessionSettings, StatusView};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: u32,
    /// The command
    pub command: Command,
}

fn default_api_version() -> u32 {
    API_VERSION
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.result, ResponseResult::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotAuthorized,
    SessionActive,
    SessionStopping,
    NoActiveSession,
    NoInstructorPresent,
    InvalidSetting,
    InstructorExists,
    InstructorNotFound,
    WriteNotVerified,
    NoData,
    StoreError,
}

/// All possible commands.
///
/// Management commands carry the issuing `actor`; presence updates come from
/// the voice gateway and are trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // Session lifecycle
    StartSession {
        actor: ParticipantId,
        channel: ChannelId,
    },
    StopSession {
        actor: ParticipantId,
    },
    GetReport {
        actor: ParticipantId,
    },
    ClearSnapshots {
        actor: ParticipantId,
    },
    GetStatus,

    // Instructor registry
    AddInstructor {
        actor: ParticipantId,
        member: ParticipantId,
    },
    RemoveInstructor {
        actor: ParticipantId,
        member: ParticipantId,
    },
    ListInstructors {
        actor: ParticipantId,
    },

    // Settings
    GetSettings {
        actor: ParticipantId,
    },
    SetMinimumAttendance {
        actor: ParticipantId,
        rate: f64,
    },
    SetSnapshotInterval {
        actor: ParticipantId,
        seconds: u64,
    },
    SetAutoClear {
        actor: ParticipantId,
        event: AutoClearEvent,
        enabled: bool,
    },
    SetEphemeralResponses {
        actor: ParticipantId,
        enabled: bool,
    },

    // Presence updates
    MemberJoined {
        channel: ChannelId,
        member: ParticipantId,
    },
    MemberLeft {
        channel: ChannelId,
        member: ParticipantId,
    },
    ChannelRemoved {
        channel: ChannelId,
    },

    /// Ping for keepalive
    Ping,
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    SessionStarted {
        session_id: SessionId,
        channel: ChannelId,
        snapshot_interval_seconds: u64,
        /// Whether the new-session auto-clear ran and succeeded
        auto_cleared: Option<bool>,
    },
    /// Stop accepted; `pending` when an in-flight tick still has to finish
    SessionStopping {
        pending: bool,
    },
    Report {
        report: AttendanceReport,
        csv: String,
        csv_filename: String,
    },
    SnapshotsCleared,
    Status {
        status: StatusView,
    },
    Instructors {
        instructors: Vec<ParticipantId>,
    },
    InstructorAdded {
        member: ParticipantId,
    },
    InstructorRemoved {
        member: ParticipantId,
    },
    Settings {
        settings: SessionSettings,
    },
    SettingUpdated {
        settings: SessionSettings,
    },
    PresenceUpdated,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = Request::new(
            1,
            Command::StartSession {
                actor: ParticipantId::new(10),
                channel: ChannelId::new(20),
            },
        );
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(
            parsed.command,
            Command::StartSession { actor, channel }
                if actor == ParticipantId::new(10) && channel == ChannelId::new(20)
        ));
    }

    #[test]
    fn request_without_api_version() {
        let line = r#"{"request_id":7,"command":{"type":"set_auto_clear","actor":1,"event":"after_report","enabled":true}}"#;
        let parsed: Request = serde_json::from_str(line).unwrap();

        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(
            parsed.command,
            Command::SetAutoClear { event: AutoClearEvent::AfterReport, enabled: true, .. }
        ));
    }

    #[test]
    fn error_response_serialization() {
        let resp = Response::error(3, ErrorInfo::new(ErrorCode::NotAuthorized, "nope"));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""code":"not_authorized""#));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_ok());
    }
}
