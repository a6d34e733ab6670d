//! Drift-free sample clock for the transmitter

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::warn;

use crate::{Result, StreamError};

/// Lag beyond which the schedule is re-anchored instead of bursting.
pub const MAX_LAG: Duration = Duration::from_millis(250);

/// Absolute-deadline ticker.
///
/// Deadline `k` is `anchor + k * period`, so time spent encoding and writing
/// between ticks never accumulates into drift. The first tick completes
/// immediately.
///
/// [`tick`](Pacer::tick) is cancel-safe: the schedule only advances once the
/// sleep completes.
#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    next: Instant,
    max_lag: Duration,
    reanchors: u64,
}

impl Pacer {
    pub fn new(rate_hz: f64) -> Result<Self> {
        Ok(Self {
            period: period_for(rate_hz)?,
            next: Instant::now(),
            max_lag: MAX_LAG,
            reanchors: 0,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Times the schedule was reset after falling too far behind
    pub fn reanchors(&self) -> u64 {
        self.reanchors
    }

    /// Wait for the next deadline.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        if now > self.next + self.max_lag {
            warn!("Pacing fell {:?} behind, re-anchoring schedule", now - self.next);
            self.next = now;
            self.reanchors += 1;
        }

        sleep_until(self.next).await;
        self.next += self.period;
    }
}

fn period_for(rate_hz: f64) -> Result<Duration> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(StreamError::config(format!("tick rate {} must be positive", rate_hz)));
    }
    Ok(Duration::from_secs_f64(1.0 / rate_hz))
}
