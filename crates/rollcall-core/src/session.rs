//! Session state machine

use chrono::{DateTime, Local};
use rollcall_api::{SessionEndReason, SessionState};
use rollcall_util::{ChannelId, SessionId};
use std::time::Duration;

use crate::{CancelToken, CoreError, CoreResult, TickStart, TickTicket};

/// The one attendance session that may exist at a time
#[derive(Debug)]
pub struct ActiveSession {
    pub session_id: SessionId,

    /// Target channel; cleared as soon as a stop is requested
    pub channel: Option<ChannelId>,

    /// Sampling interval, fixed at start
    pub interval: Duration,

    pub started_at: DateTime<Local>,

    /// Ticks fired so far, including skipped ones
    pub ticks: u64,

    pub snapshots_recorded: u64,

    cancel: CancelToken,
    end_reason: Option<SessionEndReason>,
    in_flight: Option<u64>,
}

impl ActiveSession {
    fn new(channel: ChannelId, interval: Duration, now: DateTime<Local>) -> Self {
        Self {
            session_id: SessionId::new(),
            channel: Some(channel),
            interval,
            started_at: now,
            ticks: 0,
            snapshots_recorded: 0,
            cancel: CancelToken::new(),
            end_reason: None,
            in_flight: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn tick_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Signal cancellation and drop the target channel.
    ///
    /// The first reason wins; later requests are no-ops.
    pub fn request_cancel(&mut self, reason: SessionEndReason) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.channel = None;
        self.end_reason = Some(reason);
    }

    fn summary(&self, reason: SessionEndReason) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            reason,
            ticks: self.ticks,
            snapshots_recorded: self.snapshots_recorded,
        }
    }
}

/// What a finished session looked like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub reason: SessionEndReason,
    pub ticks: u64,
    pub snapshots_recorded: u64,
}

/// Result of a stop request
#[derive(Debug, Clone, PartialEq)]
pub enum StopProgress {
    /// A tick is still in flight; the session ends when it completes
    Pending,
    /// Nothing was in flight; the session is already Idle
    Ended(SessionSummary),
}

/// Session runtime state owned by the engine.
///
/// `Idle` is the absence of a session; `Cancelling` is a session whose cancel
/// token has been signalled.
#[derive(Debug, Default)]
pub struct SessionRuntime {
    active: Option<ActiveSession>,
}

impl SessionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        match &self.active {
            None => SessionState::Idle,
            Some(s) if s.is_cancelled() => SessionState::Cancelling,
            Some(_) => SessionState::Running,
        }
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_ref()
    }

    /// Reject unless Idle, naming what is in the way
    pub fn ensure_idle(&self) -> CoreResult<()> {
        match &self.active {
            None => Ok(()),
            Some(s) => match s.channel {
                Some(channel) if !s.is_cancelled() => Err(CoreError::AlreadyRunning(channel)),
                _ => Err(CoreError::AlreadyStopping),
            },
        }
    }

    /// Idle -> Running
    pub fn begin(
        &mut self,
        channel: ChannelId,
        interval: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<&ActiveSession> {
        self.ensure_idle()?;
        Ok(self.active.insert(ActiveSession::new(channel, interval, now)))
    }

    /// Running -> Cancelling, and on to Idle when no tick is in flight
    pub fn request_stop(&mut self, reason: SessionEndReason) -> CoreResult<StopProgress> {
        let session = self.active.as_mut().ok_or(CoreError::NothingToStop)?;
        if session.is_cancelled() {
            return Err(CoreError::AlreadyStopping);
        }

        session.request_cancel(reason);

        if session.tick_in_flight() {
            return Ok(StopProgress::Pending);
        }

        match self.finish_if_cancelled() {
            Some(summary) => Ok(StopProgress::Ended(summary)),
            None => Ok(StopProgress::Pending),
        }
    }

    /// Fire one tick
    pub fn begin_tick(&mut self) -> TickStart {
        let Some(session) = self.active.as_mut() else {
            return TickStart::Idle;
        };
        if session.tick_in_flight() {
            return TickStart::Busy;
        }

        session.ticks += 1;

        let channel = match session.channel {
            Some(channel) if !session.is_cancelled() => channel,
            _ => {
                return match self.finish_if_cancelled() {
                    Some(summary) => TickStart::Cancelled(summary),
                    None => TickStart::Idle,
                };
            }
        };

        session.in_flight = Some(session.ticks);
        TickStart::Sample(TickTicket {
            session_id: session.session_id,
            channel,
            tick: session.ticks,
        })
    }

    /// Accept the result for `ticket`; `None` if it belongs to no live tick
    pub fn settle_tick(&mut self, ticket: &TickTicket) -> Option<&mut ActiveSession> {
        let session = self.active.as_mut()?;
        if session.session_id != ticket.session_id || session.in_flight != Some(ticket.tick) {
            return None;
        }
        session.in_flight = None;
        Some(session)
    }

    /// Cancelling -> Idle, once nothing is in flight
    pub fn finish_if_cancelled(&mut self) -> Option<SessionSummary> {
        let session = self.active.as_ref()?;
        if !session.is_cancelled() || session.tick_in_flight() {
            return None;
        }
        let summary = session.summary(session.end_reason.unwrap_or(SessionEndReason::Stopped));
        self.active = None;
        Some(summary)
    }

    /// Unconditional * -> Idle; any in-flight tick is forgotten
    pub fn force_idle(&mut self) -> Option<SessionSummary> {
        self.active
            .take()
            .map(|s| s.summary(SessionEndReason::Shutdown))
    }
}
