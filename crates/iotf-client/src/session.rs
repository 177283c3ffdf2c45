//! Connection session state and reconnect backoff.
//!
//! `Session` holds only bookkeeping: the handle performs the I/O and
//! reports each outcome here, so every transition can be exercised
//! without a broker.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Connection status of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting `next_delay` before reconnect attempt number `attempt`.
    Reconnecting { attempt: u32, next_delay: Duration },
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting {
                attempt,
                next_delay,
            } => write!(f, "reconnecting (attempt {attempt} in {next_delay:?})"),
        }
    }
}

/// Exponential backoff with a cap: `min(initial * 2^(attempt-1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Session bookkeeping for one handle.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    backoff: Backoff,
    /// Current reconnect attempt; 0 while connected or never connected.
    attempt: u32,
    next_attempt_at: Option<Instant>,
    /// Set by an explicit disconnect, cleared by the next connect.
    torn_down: bool,
}

impl Session {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: SessionState::Disconnected,
            backoff,
            attempt: 0,
            next_attempt_at: None,
            torn_down: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// A caller-initiated connect is starting.
    pub fn begin_connect(&mut self) {
        self.torn_down = false;
        self.attempt = 0;
        self.next_attempt_at = None;
        self.state = SessionState::Connecting;
    }

    /// A scheduled reconnect attempt is starting.
    pub fn begin_reconnect(&mut self) {
        self.next_attempt_at = None;
        self.state = SessionState::Connecting;
    }

    pub fn on_connected(&mut self) {
        self.attempt = 0;
        self.next_attempt_at = None;
        self.state = SessionState::Connected;
    }

    /// A caller-initiated connect failed. Nothing is scheduled.
    pub fn on_connect_failed(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// The link dropped, or a failed connect is being retried: schedule
    /// the first reconnect attempt.
    pub fn on_connection_lost(&mut self, now: Instant) {
        self.schedule(1, now);
    }

    pub fn on_reconnect_failed(&mut self, now: Instant) {
        self.schedule(self.attempt.saturating_add(1), now);
    }

    /// Explicit disconnect: terminal until the next `begin_connect`.
    pub fn on_disconnect(&mut self) {
        self.torn_down = true;
        self.attempt = 0;
        self.next_attempt_at = None;
        self.state = SessionState::Disconnected;
    }

    fn schedule(&mut self, attempt: u32, now: Instant) {
        let next_delay = self.backoff.delay(attempt);
        self.attempt = attempt;
        self.next_attempt_at = Some(now + next_delay);
        self.state = SessionState::Reconnecting {
            attempt,
            next_delay,
        };
    }
}
