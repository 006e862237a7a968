//! Connection lifecycle state machine.
//!
//! Tracks one logical client connection across any number of physical links:
//! opening, authenticating, keepalive, teardown and reconnect backoff.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept time as a parameter (no stored Environment)
//! - Methods return `Vec<ConnectionAction>`
//! - The driver executes the actions (open a link, send a ping, reject
//!   pending requests, invoke callbacks)
//!
//! Each physical link attempt gets a new epoch. Link events carry the epoch
//! they belong to, and events from a superseded epoch are ignored, so a late
//! close from an old socket can never tear down its replacement.
//!
//! # State Machine
//!
//! ```text
//!  ┌──────┐ connect ┌────────────┐ opened ┌──────┐  ┌────────────────┐ ok ┌───────────────┐
//!  │ Idle │────────>│ Connecting │───────>│ Open │─>│ Authenticating │───>│ Authenticated │
//!  └──────┘         └────────────┘        └──────┘  └────────────────┘    └───────────────┘
//!                         │ fail                           │ fail                 │ disconnect
//!                         ↓                                ↓                      ↓
//!                    ┌─────────┐<──────────────────────────┘                ┌─────────┐
//!                    │  Error  │                                            │ Closing │
//!                    └─────────┘                                            └─────────┘
//!                         │ unintentional, had authenticated                     │ closed
//!                         ↓                                                      ↓
//!                  ┌──────────────┐           backoff elapsed              ┌────────┐
//!                  │ Reconnecting │─────────────> Connecting               │ Closed │
//!                  └──────────────┘                                        └────────┘
//! ```
//!
//! # Reconnect
//!
//! Automatic reconnect is armed by the first successful authentication and
//! disarmed by an explicit disconnect. Attempt `n` (zero-based) waits
//! `min(base * multiplier^n, cap)`; after `max_attempts` consecutive failures
//! the machine gives up and reports [`ConnectionAction::ReconnectExhausted`].

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::ConnectionError;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never connected
    Idle,
    /// Opening the transport
    Connecting,
    /// Transport open, handshake not started
    Open,
    /// Handshake in flight
    Authenticating,
    /// Handshake complete, requests allowed
    Authenticated,
    /// Caller-initiated close in progress
    Closing,
    /// Link closed
    Closed,
    /// Link failed
    Error,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl Phase {
    /// True while a link attempt is in progress or established.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Authenticating | Self::Authenticated)
    }
}

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Generate a session key and open a link tagged with `epoch`
    OpenTransport {
        /// Epoch of the new link
        epoch: u64,
    },
    /// Run the auth handshake on the `epoch` link
    BeginAuth {
        /// Epoch of the link to authenticate
        epoch: u64,
    },
    /// Transport is open (`on_open`)
    NotifyOpen,
    /// Handshake succeeded (`on_authenticated`)
    NotifyAuthenticated,
    /// Link is gone (`on_close`)
    NotifyClosed,
    /// Send a fire-and-forget keepalive ping
    SendPing,
    /// Keepalive was running and is now stopped
    StopKeepalive,
    /// Fail every outstanding request with `ConnectionClosed`
    RejectPending,
    /// Close and drop the current link
    CloseTransport,
    /// A scheduled reconnect was cancelled
    CancelReconnect,
    /// A reconnect is scheduled after `delay`
    ScheduleReconnect {
        /// One-based attempt number
        attempt: u32,
        /// Backoff before the attempt
        delay: Duration,
    },
    /// Reconnect gave up
    ReconnectExhausted {
        /// Attempts made
        attempts: u32,
    },
}

/// Exponential backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Growth factor per retry
    pub multiplier: u32,
    /// Upper bound on any single delay
    pub cap: Duration,
    /// Retries before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            multiplier: 2,
            cap: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before zero-based retry `attempt`, or `None` once exhausted.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let scaled = self
            .multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(self.cap);
        Some(scaled.min(self.cap))
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Ping interval while authenticated
    pub keepalive_interval: Duration,
    /// Backoff for automatic reconnect
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { keepalive_interval: Duration::from_secs(30), reconnect: ReconnectPolicy::default() }
    }
}

/// Connection state machine.
///
/// Pure: no I/O, no stored clock. The driver owns it and feeds it link
/// events and timer expiries.
#[derive(Debug, Clone)]
pub struct Connection {
    phase: Phase,
    config: ConnectionConfig,
    epoch: u64,
    /// Consecutive failed reconnect attempts
    attempts: u32,
    /// Armed by the first successful auth
    auto_reconnect: bool,
    /// Current teardown was requested by the caller
    intentional: bool,
    /// Link for the current epoch has been opened
    link_up: bool,
    keepalive_due: Option<Instant>,
    reconnect_at: Option<Instant>,
}

impl Connection {
    /// New connection in `Idle`.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            phase: Phase::Idle,
            config,
            epoch: 0,
            attempts: 0,
            auto_reconnect: false,
            intentional: false,
            link_up: false,
            keepalive_due: None,
            reconnect_at: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Epoch of the current (or most recent) link.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Consecutive reconnect attempts since the last successful auth.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when the link is open and authenticated.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    /// Configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Caller asked to connect.
    ///
    /// Starts a new epoch from a resting phase. Returns no actions when an
    /// attempt is already under way or established.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a caller-initiated close is still in progress.
    pub fn connect(&mut self, _now: Instant) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.phase {
            Phase::Closing => {
                Err(ConnectionError::InvalidState { phase: self.phase, operation: "connect" })
            },
            phase if phase.is_live() => Ok(vec![]),
            _ => {
                self.attempts = 0;
                self.intentional = false;
                self.reconnect_at = None;
                Ok(self.start_attempt())
            },
        }
    }

    fn start_attempt(&mut self) -> Vec<ConnectionAction> {
        self.epoch += 1;
        self.phase = Phase::Connecting;
        self.link_up = false;
        debug!(epoch = self.epoch, attempt = self.attempts, "starting link attempt");
        vec![ConnectionAction::OpenTransport { epoch: self.epoch }]
    }

    /// The link for `epoch` is open.
    pub fn transport_opened(&mut self, epoch: u64, _now: Instant) -> Vec<ConnectionAction> {
        if epoch != self.epoch || self.phase != Phase::Connecting {
            return vec![];
        }
        self.link_up = true;
        self.phase = Phase::Open;
        let mut actions = vec![ConnectionAction::NotifyOpen];
        self.phase = Phase::Authenticating;
        actions.push(ConnectionAction::BeginAuth { epoch });
        actions
    }

    /// The handshake on `epoch` succeeded.
    pub fn authenticated(&mut self, epoch: u64, now: Instant) -> Vec<ConnectionAction> {
        if epoch != self.epoch || self.phase != Phase::Authenticating {
            return vec![];
        }
        self.phase = Phase::Authenticated;
        self.attempts = 0;
        self.auto_reconnect = true;
        self.keepalive_due = Some(now + self.config.keepalive_interval);
        vec![ConnectionAction::NotifyAuthenticated]
    }

    /// The link for `epoch` closed.
    pub fn closed(&mut self, epoch: u64, now: Instant) -> Vec<ConnectionAction> {
        self.link_down(epoch, now, Phase::Closed)
    }

    /// The link for `epoch` failed (open error, timeout, auth failure).
    pub fn failed(&mut self, epoch: u64, now: Instant) -> Vec<ConnectionAction> {
        self.link_down(epoch, now, Phase::Error)
    }

    fn link_down(&mut self, epoch: u64, now: Instant, resting: Phase) -> Vec<ConnectionAction> {
        if epoch != self.epoch {
            trace!(epoch, current = self.epoch, "ignoring event from superseded link");
            return vec![];
        }
        match self.phase {
            Phase::Closing => {
                self.phase = Phase::Closed;
                self.link_up = false;
                vec![ConnectionAction::NotifyClosed]
            },
            phase if phase.is_live() => {
                let had_link = self.link_up;
                let mut actions = self.release();
                if had_link {
                    actions.push(ConnectionAction::NotifyClosed);
                }
                self.phase = resting;
                actions.extend(self.schedule_reconnect(now));
                actions
            },
            _ => vec![],
        }
    }

    /// Stop keepalive, reject pending requests and drop the link.
    fn release(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if self.keepalive_due.take().is_some() {
            actions.push(ConnectionAction::StopKeepalive);
        }
        actions.push(ConnectionAction::RejectPending);
        if self.link_up {
            self.link_up = false;
            actions.push(ConnectionAction::CloseTransport);
        }
        actions
    }

    fn schedule_reconnect(&mut self, now: Instant) -> Vec<ConnectionAction> {
        if self.intentional || !self.auto_reconnect {
            return vec![];
        }
        match self.config.reconnect.delay(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.reconnect_at = Some(now + delay);
                self.phase = Phase::Reconnecting;
                vec![ConnectionAction::ScheduleReconnect { attempt: self.attempts, delay }]
            },
            None => {
                self.auto_reconnect = false;
                debug!(attempts = self.attempts, "reconnect budget spent");
                vec![ConnectionAction::ReconnectExhausted { attempts: self.attempts }]
            },
        }
    }

    /// Caller asked to disconnect.
    ///
    /// Idempotent: only the first call from a live or reconnecting phase
    /// yields actions. When a link was open the machine waits in `Closing`
    /// for the driver to report [`Connection::closed`].
    pub fn disconnect(&mut self, _now: Instant) -> Vec<ConnectionAction> {
        self.auto_reconnect = false;
        match self.phase {
            Phase::Reconnecting => {
                self.reconnect_at = None;
                self.phase = Phase::Closed;
                vec![ConnectionAction::CancelReconnect]
            },
            phase if phase.is_live() => {
                self.intentional = true;
                let had_link = self.link_up;
                let actions = self.release();
                self.phase = if had_link { Phase::Closing } else { Phase::Closed };
                actions
            },
            _ => vec![],
        }
    }

    /// Process timers due at `now`: keepalive pings and scheduled reconnects.
    pub fn tick(&mut self, now: Instant) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        let keepalive_due = self.keepalive_due.is_some_and(|due| due <= now);
        if self.phase == Phase::Authenticated && keepalive_due {
            self.keepalive_due = Some(now + self.config.keepalive_interval);
            actions.push(ConnectionAction::SendPing);
        }

        let reconnect_due = self.reconnect_at.is_some_and(|at| at <= now);
        if self.phase == Phase::Reconnecting && reconnect_due {
            self.reconnect_at = None;
            actions.extend(self.start_attempt());
        }

        actions
    }

    /// Earliest instant at which [`Connection::tick`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        let keepalive = self.keepalive_due.filter(|_| self.phase == Phase::Authenticated);
        let reconnect = self.reconnect_at.filter(|_| self.phase == Phase::Reconnecting);
        match (keepalive, reconnect) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
