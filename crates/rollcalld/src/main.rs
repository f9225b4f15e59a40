//! rollcalld - The rollcall attendance service
//!
//! This is the main entry point for the rollcalld service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Session engine
//! - Channel directory fed by presence updates
//! - NDJSON protocol on stdin/stdout

use anyhow::{Context, Result};
use clap::Parser;
use rollcall_api::{
    API_VERSION, Command, ErrorCode, ErrorInfo, Event, EventPayload, Request, Response,
    ResponsePayload,
};
use rollcall_config::load_config;
use rollcall_core::{CoreError, CoreEvent, SessionEngine, StopProgress, TickStart, TickTicket};
use rollcall_host_api::{ChannelDirectory, HostResult, MemoryDirectory};
use rollcall_store::{SqliteStore, Store};
use rollcall_util::{DATABASE_FILENAME, ParticipantId, default_config_path};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// rollcalld - Voice channel attendance service
#[derive(Parser, Debug)]
#[command(name = "rollcalld")]
#[command(about = "Voice channel attendance service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/rollcall/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set ROLLCALL_DATA_DIR env var)
    #[arg(short, long, env = "ROLLCALL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Membership resolved off the event loop for one tick
type TickResult = (TickTicket, HostResult<Vec<ParticipantId>>);

/// Main service state
struct Service {
    engine: SessionEngine,
    directory: MemoryDirectory,
    store: Arc<dyn Store>,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        // Load configuration
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            owner = %config.owner,
            seed_instructors = config.seed_instructors.len(),
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.data_dir.clone());

        // Initialize store
        let db_path = data_dir.join(DATABASE_FILENAME);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        store
            .prepare_for_startup(&config.defaults, &config.seed_instructors)
            .context("Failed to prepare store for startup")?;

        info!(db_path = %db_path.display(), "Store initialized");

        Ok(Self::with_parts(
            SessionEngine::new(config.owner, store.clone()),
            MemoryDirectory::new(),
            store,
        ))
    }

    fn with_parts(engine: SessionEngine, directory: MemoryDirectory, store: Arc<dyn Store>) -> Self {
        Self {
            engine,
            directory,
            store,
        }
    }

    async fn run(mut self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests from `input` until a signal, end of input, or a
    /// failed write; the engine is always shut down afterwards.
    async fn serve<R, W>(&mut self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        let (tick_tx, mut tick_rx) = mpsc::unbounded_channel::<TickResult>();
        let mut sampler: Option<Interval> = None;

        // Set up signal handlers
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        info!("Service running");

        'service: loop {
            let mut events: Vec<CoreEvent> = Vec::new();

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Requests and presence updates, one JSON object per line
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let response = self.handle_line(&line, &mut events).await;
                            if let Err(e) = write_message(&mut output, &response).await {
                                error!(error = %e, "Output closed, shutting down");
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("Input closed, shutting down");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to read input");
                            break;
                        }
                    }
                }

                // Sampler timer
                _ = next_tick(&mut sampler) => {
                    match self.engine.begin_tick() {
                        TickStart::Sample(ticket) => {
                            let directory = self.directory.clone();
                            let tx = tick_tx.clone();
                            tokio::spawn(async move {
                                let result = directory.members(ticket.channel).await;
                                let _ = tx.send((ticket, result));
                            });
                        }
                        TickStart::Cancelled(summary) => events.push((&summary).into()),
                        TickStart::Busy | TickStart::Idle => {}
                    }
                }

                // Membership resolved for an in-flight tick
                Some((ticket, result)) = tick_rx.recv() => {
                    events.extend(self.engine.complete_tick(&ticket, result));
                }
            }

            for event in events {
                if let Err(e) = write_message(&mut output, &Event::new(event_payload(event))).await
                {
                    error!(error = %e, "Output closed, shutting down");
                    break 'service;
                }
            }

            self.sync_sampler(&mut sampler);
        }

        // Graceful shutdown
        info!("Shutting down rollcalld");

        if let Some(event) = self.engine.shutdown() {
            if let Err(e) = write_message(&mut output, &Event::new(event_payload(event))).await {
                warn!(error = %e, "Shutdown event not delivered");
            }
        }

        if !self.store.is_healthy() {
            warn!("Store unhealthy at shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Arm or disarm the sampler timer to match the engine
    fn sync_sampler(&self, sampler: &mut Option<Interval>) {
        match (self.engine.sampling_interval(), sampler.is_some()) {
            (Some(period), false) => {
                // First tick fires immediately
                let mut timer = tokio::time::interval(period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *sampler = Some(timer);
                debug!(period_secs = period.as_secs(), "Sampler armed");
            }
            (None, true) => {
                *sampler = None;
                debug!("Sampler disarmed");
            }
            _ => {}
        }
    }

    async fn handle_line(&mut self, line: &str, events: &mut Vec<CoreEvent>) -> Response {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Invalid request");
                return Response::error(
                    0,
                    ErrorInfo::new(ErrorCode::InvalidRequest, format!("Invalid request: {e}")),
                );
            }
        };

        if request.api_version != API_VERSION {
            return Response::error(
                request.request_id,
                ErrorInfo::new(
                    ErrorCode::InvalidRequest,
                    format!(
                        "Unsupported API version {} (expected {API_VERSION})",
                        request.api_version
                    ),
                ),
            );
        }

        match self.handle_command(request.command, events).await {
            Ok(payload) => Response::success(request.request_id, payload),
            Err(e) => {
                if e.is_fault() {
                    error!(request_id = request.request_id, error = %e, "Command failed");
                } else {
                    debug!(request_id = request.request_id, error = %e, "Command rejected");
                }
                Response::error(request.request_id, ErrorInfo::new(e.code(), e.to_string()))
            }
        }
    }

    async fn handle_command(
        &mut self,
        command: Command,
        events: &mut Vec<CoreEvent>,
    ) -> Result<ResponsePayload, CoreError> {
        let now = rollcall_util::now();

        match command {
            Command::StartSession { actor, channel } => {
                // An unknown channel simply has nobody in it
                let live = match self.directory.members(channel).await {
                    Ok(members) => members,
                    Err(e) => {
                        debug!(channel = %channel, error = %e, "Channel unresolvable at start");
                        Vec::new()
                    }
                };

                let start = self.engine.start_session(actor, channel, &live, now)?;
                events.push(start.event());

                Ok(ResponsePayload::SessionStarted {
                    session_id: start.session_id,
                    channel: start.channel,
                    snapshot_interval_seconds: start.interval.as_secs(),
                    auto_cleared: start.auto_cleared,
                })
            }

            Command::StopSession { actor } => match self.engine.stop_session(actor)? {
                StopProgress::Pending => Ok(ResponsePayload::SessionStopping { pending: true }),
                StopProgress::Ended(summary) => {
                    events.push((&summary).into());
                    Ok(ResponsePayload::SessionStopping { pending: false })
                }
            },

            Command::GetReport { actor } => {
                let report = self.engine.report(actor, now)?;
                let csv = report.to_csv();
                let csv_filename = report.csv_filename();
                Ok(ResponsePayload::Report {
                    report,
                    csv,
                    csv_filename,
                })
            }

            Command::ClearSnapshots { actor } => {
                self.engine.clear_snapshots(actor)?;
                Ok(ResponsePayload::SnapshotsCleared)
            }

            Command::GetStatus => Ok(ResponsePayload::Status {
                status: self.engine.status()?,
            }),

            Command::AddInstructor { actor, member } => {
                self.engine.add_instructor(actor, member)?;
                Ok(ResponsePayload::InstructorAdded { member })
            }

            Command::RemoveInstructor { actor, member } => {
                self.engine.remove_instructor(actor, member)?;
                Ok(ResponsePayload::InstructorRemoved { member })
            }

            Command::ListInstructors { actor } => Ok(ResponsePayload::Instructors {
                instructors: self.engine.list_instructors(actor)?,
            }),

            Command::GetSettings { actor } => Ok(ResponsePayload::Settings {
                settings: self.engine.settings(actor)?,
            }),

            Command::SetMinimumAttendance { actor, rate } => Ok(ResponsePayload::SettingUpdated {
                settings: self.engine.set_minimum_attendance_rate(actor, rate)?,
            }),

            Command::SetSnapshotInterval { actor, seconds } => {
                Ok(ResponsePayload::SettingUpdated {
                    settings: self.engine.set_snapshot_interval(actor, seconds)?,
                })
            }

            Command::SetAutoClear {
                actor,
                event,
                enabled,
            } => Ok(ResponsePayload::SettingUpdated {
                settings: self.engine.set_auto_clear(actor, event, enabled)?,
            }),

            Command::SetEphemeralResponses { actor, enabled } => {
                Ok(ResponsePayload::SettingUpdated {
                    settings: self.engine.set_responses_ephemeral(actor, enabled)?,
                })
            }

            Command::MemberJoined { channel, member } => {
                self.directory.join(channel, member);
                Ok(ResponsePayload::PresenceUpdated)
            }

            Command::MemberLeft { channel, member } => {
                self.directory.leave(channel, member);
                Ok(ResponsePayload::PresenceUpdated)
            }

            Command::ChannelRemoved { channel } => {
                self.directory.remove_channel(channel);
                Ok(ResponsePayload::PresenceUpdated)
            }

            Command::Ping => Ok(ResponsePayload::Pong),
        }
    }
}

/// Completes on the next sampler tick; never while disarmed
async fn next_tick(sampler: &mut Option<Interval>) {
    match sampler {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::SessionStarted {
            session_id,
            channel,
            interval,
        } => EventPayload::SessionStarted {
            session_id,
            channel,
            snapshot_interval_seconds: interval.as_secs(),
        },
        CoreEvent::SnapshotRecorded {
            session_id,
            tick,
            members,
        } => EventPayload::SnapshotRecorded {
            session_id,
            tick,
            members,
        },
        CoreEvent::SnapshotWriteFailed {
            session_id,
            tick,
            message,
        } => EventPayload::SnapshotWriteFailed {
            session_id,
            tick,
            message,
        },
        CoreEvent::InstructorLeft {
            session_id,
            channel,
        } => EventPayload::InstructorLeft {
            session_id,
            channel,
        },
        CoreEvent::SessionEnded {
            session_id,
            reason,
            ticks,
        } => EventPayload::SessionEnded {
            session_id,
            reason,
            ticks,
        },
    }
}

/// Write one message as a single JSON line
async fn write_message<W, T>(out: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).context("Failed to serialize message")?;
    line.push(b'\n');
    out.write_all(&line).await.context("Failed to write output")?;
    out.flush().await.context("Failed to flush output")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the protocol
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    let service = Service::new(&args)?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_api::{ResponseResult, SessionSettings, SessionState};
    use rollcall_util::ChannelId;
    use std::pin::Pin;
    use std::task::{self, Poll};

    const OWNER: u64 = 1;
    const INSTRUCTOR: u64 = 2;

    fn service() -> Service {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        store
            .prepare_for_startup(&SessionSettings::default(), &[ParticipantId::new(INSTRUCTOR)])
            .unwrap();
        Service::with_parts(
            SessionEngine::new(ParticipantId::new(OWNER), store.clone()),
            MemoryDirectory::new(),
            store,
        )
    }

    async fn send(service: &mut Service, line: &str) -> (Response, Vec<CoreEvent>) {
        let mut events = Vec::new();
        let response = service.handle_line(line, &mut events).await;
        (response, events)
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        match &response.result {
            ResponseResult::Err(e) => Some(e.code),
            ResponseResult::Ok(_) => None,
        }
    }

    #[tokio::test]
    async fn malformed_lines_are_rejected() {
        let mut service = service();

        let (response, _) = send(&mut service, "not json").await;
        assert_eq!(response.request_id, 0);
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));

        let (response, _) = send(
            &mut service,
            r#"{"request_id":3,"api_version":99,"command":{"type":"ping"}}"#,
        )
        .await;
        assert_eq!(response.request_id, 3);
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidRequest));

        let (response, _) = send(&mut service, r#"{"request_id":4,"command":{"type":"ping"}}"#).await;
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Pong)));
    }

    #[tokio::test]
    async fn start_uses_presence_updates() {
        let mut service = service();

        let (response, _) = send(
            &mut service,
            r#"{"request_id":1,"command":{"type":"start_session","actor":2,"channel":50}}"#,
        )
        .await;
        assert_eq!(error_code(&response), Some(ErrorCode::NoInstructorPresent));

        send(
            &mut service,
            r#"{"request_id":2,"command":{"type":"member_joined","channel":50,"member":2}}"#,
        )
        .await;

        let (response, events) = send(
            &mut service,
            r#"{"request_id":3,"command":{"type":"start_session","actor":2,"channel":50}}"#,
        )
        .await;
        assert!(response.is_ok());
        assert!(matches!(
            events.as_slice(),
            [CoreEvent::SessionStarted { channel, .. }] if *channel == ChannelId::new(50)
        ));
        assert_eq!(service.engine.state(), SessionState::Running);

        let mut sampler = None;
        service.sync_sampler(&mut sampler);
        assert!(sampler.is_some());

        let (response, events) = send(
            &mut service,
            r#"{"request_id":4,"command":{"type":"stop_session","actor":1}}"#,
        )
        .await;
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::SessionStopping { pending: false })
        ));
        assert_eq!(events.len(), 1);

        service.sync_sampler(&mut sampler);
        assert!(sampler.is_none());
    }

    #[tokio::test]
    async fn report_carries_csv() {
        let mut service = service();
        service
            .store
            .save_snapshots(&[
                rollcall_api::Snapshot::new([ParticipantId::new(2), ParticipantId::new(7)]),
                rollcall_api::Snapshot::new([ParticipantId::new(8)]),
            ])
            .unwrap();

        let (response, _) = send(
            &mut service,
            r#"{"request_id":9,"command":{"type":"get_report","actor":1}}"#,
        )
        .await;

        match response.result {
            ResponseResult::Ok(ResponsePayload::Report {
                report,
                csv,
                csv_filename,
            }) => {
                assert_eq!(report.instructors_present, vec![ParticipantId::new(2)]);
                assert_eq!(csv, "member_id,attended\n7,true\n8,true\n");
                assert!(csv_filename.starts_with("attendance_export_"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejections_map_to_codes() {
        let mut service = service();

        let (response, _) = send(
            &mut service,
            r#"{"request_id":1,"command":{"type":"get_report","actor":99}}"#,
        )
        .await;
        assert_eq!(error_code(&response), Some(ErrorCode::NotAuthorized));

        let (response, _) = send(
            &mut service,
            r#"{"request_id":2,"command":{"type":"set_snapshot_interval","actor":1,"seconds":1}}"#,
        )
        .await;
        assert_eq!(error_code(&response), Some(ErrorCode::InvalidSetting));

        let (response, _) = send(
            &mut service,
            r#"{"request_id":3,"command":{"type":"stop_session","actor":1}}"#,
        )
        .await;
        assert_eq!(error_code(&response), Some(ErrorCode::NoActiveSession));
    }

    /// Writer whose reader has gone away
    struct ClosedPipe;

    impl AsyncWrite for ClosedPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut task::Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn closed_output_still_shuts_down_engine() {
        let mut service = service();
        send(
            &mut service,
            r#"{"request_id":1,"command":{"type":"member_joined","channel":50,"member":2}}"#,
        )
        .await;
        let (response, _) = send(
            &mut service,
            r#"{"request_id":2,"command":{"type":"start_session","actor":2,"channel":50}}"#,
        )
        .await;
        assert!(response.is_ok());
        assert_eq!(service.engine.state(), SessionState::Running);

        // More input follows the request that fails to write
        let input = BufReader::new(
            &b"{\"request_id\":3,\"command\":{\"type\":\"ping\"}}\n\
               {\"request_id\":4,\"command\":{\"type\":\"ping\"}}\n"[..],
        );
        service.serve(input, ClosedPipe).await.unwrap();

        assert_eq!(service.engine.state(), SessionState::Idle);
    }

    #[test]
    fn events_keep_their_fields() {
        let payload = event_payload(CoreEvent::SessionStarted {
            session_id: rollcall_util::SessionId::new(),
            channel: ChannelId::new(5),
            interval: std::time::Duration::from_secs(30),
        });
        assert!(matches!(
            payload,
            EventPayload::SessionStarted { snapshot_interval_seconds: 30, .. }
        ));
    }
}
