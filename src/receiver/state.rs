//! Receiver connection state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{Result, StreamError};

/// Connection lifecycle of a receiver.
///
/// `Backoff` is the "disconnected, retry pending" state: the receiver waits out
/// the policy delay and then attempts again, without limit, until an explicit
/// disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    Disconnected,
    /// Attempt number `attempt` (1-based) in flight
    Connecting { attempt: u32 },
    Connected,
    /// Waiting before attempt `attempt + 1`
    Backoff { attempt: u32 },
}

/// Inputs that drive [`ReceiverState::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverInput {
    ConnectRequested,
    ConnectSucceeded,
    ConnectFailed,
    /// Read error or end of stream on an established session
    ConnectionLost,
    BackoffElapsed,
    DisconnectRequested,
}

impl ReceiverState {
    /// Pure transition table. Inputs that do not apply leave the state unchanged.
    pub fn on(self, input: ReceiverInput) -> ReceiverState {
        use ReceiverInput::*;
        use ReceiverState::*;

        match (self, input) {
            (_, DisconnectRequested) => Disconnected,
            (Disconnected, ConnectRequested) => Connecting { attempt: 1 },
            // An explicit request during backoff skips the remaining wait
            (Backoff { attempt }, ConnectRequested | BackoffElapsed) => {
                Connecting { attempt: attempt.saturating_add(1) }
            }
            (Connecting { .. }, ConnectSucceeded) => Connected,
            (Connecting { attempt }, ConnectFailed) => Backoff { attempt },
            (Connected, ConnectionLost) => Backoff { attempt: 0 },
            (state, _) => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ReceiverState::Connected)
    }

    /// True while the supervisor is trying to (re)establish a session
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, ReceiverState::Connecting { .. } | ReceiverState::Backoff { .. })
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverState::Disconnected => write!(f, "disconnected"),
            ReceiverState::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            ReceiverState::Connected => write!(f, "connected"),
            ReceiverState::Backoff { attempt } => write!(f, "backoff after attempt {}", attempt),
        }
    }
}

/// Delay between reconnect attempts.
///
/// The delay before attempt `n + 1` is `initial * multiplier^(n - 1)`, capped at
/// `max`. The default is the fixed three second interval with no growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl BackoffPolicy {
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self { initial_ms: ms, max_ms: ms, multiplier: 1.0 }
    }

    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_ms: initial.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            multiplier,
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    ///
    /// Zero failures (a dropped session) waits the initial delay.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(64) as i32;
        let ms = self.initial_ms as f64 * self.multiplier.powi(exponent);
        let capped = ms.min(self.max_ms as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_ms == 0 {
            return Err(StreamError::config("backoff initial_ms must be positive"));
        }
        if self.max_ms < self.initial_ms {
            return Err(StreamError::config(format!(
                "backoff max_ms {} below initial_ms {}",
                self.max_ms, self.initial_ms
            )));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(StreamError::config(format!(
                "backoff multiplier {} must be at least 1",
                self.multiplier
            )));
        }
        Ok(())
    }
}
