//! Update rate control for forwarded frame streams

use serde::{Deserialize, Serialize};

/// Update rate for subscriber streams
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every frame at the session sample rate
    Native,

    /// Throttled to maximum Hz
    /// If the requested rate exceeds the sample rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Normalize rate against the session sample rate
    /// Returns effective rate to use
    pub fn normalize(self, sample_rate: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= sample_rate => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self, sample_rate: f64) -> Option<std::time::Duration> {
        match self.normalize(sample_rate) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}
