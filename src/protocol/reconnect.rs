//! Reconnection state machine
//!
//! ```text
//! Disconnected → Connecting → Connected
//!      ↑   ↖        ↑            │ close
//!      │     ╲      │ retry due  ↓
//!      │      ╲ Reconnecting ← Disconnected (attempts < max)
//!      └── attempts == max: halt until the caller connects again
//! ```
//!
//! The machine is pure: the client feeds it transport events and performs
//! the timers and I/O it asks for.

use std::time::Duration;

use crate::config::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            delay: Duration::from_millis(cfg.delay_ms),
        }
    }
}

/// What the client should do after a drop or a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wait `delay`, then try again
    Retry { attempt: u32, delay: Duration },
    /// Cap reached; stay disconnected
    GiveUp,
    /// The caller stopped the machine
    Halted,
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    stopped: bool,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            stopped: true,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Retries scheduled since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Caller-initiated connect
    pub fn begin_connect(&mut self) {
        self.stopped = false;
        self.state = ConnectionState::Connecting;
    }

    /// Transport reported open
    pub fn opened(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
    }

    /// Caller-initiated connect failed its handshake; no retry follows
    pub fn handshake_failed(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.stopped = true;
    }

    /// An open transport closed
    pub fn closed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// A scheduled retry failed to open
    pub fn attempt_failed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// Decide the next step after `closed` or `attempt_failed`
    pub fn next_retry(&mut self) -> Transition {
        if self.stopped {
            self.state = ConnectionState::Disconnected;
            return Transition::Halted;
        }

        if self.attempts >= self.policy.max_attempts {
            self.state = ConnectionState::Disconnected;
            return Transition::GiveUp;
        }

        self.attempts += 1;
        self.state = ConnectionState::Reconnecting;
        Transition::Retry {
            attempt: self.attempts,
            delay: self.policy.delay,
        }
    }

    /// The retry delay elapsed
    pub fn retry_due(&mut self) {
        if !self.stopped {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Caller-initiated disconnect: terminal until the next `begin_connect`
    pub fn stop(&mut self) {
        self.stopped = true;
        self.state = ConnectionState::Disconnected;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}
