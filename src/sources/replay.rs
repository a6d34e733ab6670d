//! Replay source for recorded tables

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::replay::{ReplayTable, TableRow};
use crate::source::SampleSource;
use crate::types::SampleFrame;
use crate::{Result, StreamError};

/// Accepted playback speed multipliers.
pub const SPEED_RANGE: (f64, f64) = (0.5, 5.0);

/// What happens when the cursor passes the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndPolicy {
    /// Signal `EndOfReplay` and end the session
    Stop,
    /// Wrap to the first row
    #[default]
    Cycle,
}

/// Replays table rows one per tick.
///
/// The table is shared read-only; the cursor is session-local and starts at
/// row zero.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    table: Arc<ReplayTable>,
    policy: EndPolicy,
    sample_rate: f64,
    speed: f64,
    cursor: usize,
    emitted: u32,
    wraps: u64,
}

impl ReplaySource {
    pub fn new(table: Arc<ReplayTable>, policy: EndPolicy, sample_rate: f64) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StreamError::config(format!("sample rate {} must be positive", sample_rate)));
        }

        info!(
            "Replay source: {} rows, {:?} at end, {}Hz",
            table.len(),
            policy,
            sample_rate
        );
        Ok(Self { table, policy, sample_rate, speed: 1.0, cursor: 0, emitted: 0, wraps: 0 })
    }

    /// Set playback speed
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1);
        debug!("Playback speed set to {}x", self.speed);
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.set_speed(speed);
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn policy(&self) -> EndPolicy {
        self.policy
    }

    /// Index of the row the next call will read
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl SampleSource for ReplaySource {
    fn next_frame(&mut self) -> Result<SampleFrame> {
        if self.cursor >= self.table.len() {
            match self.policy {
                EndPolicy::Stop => {
                    debug!("Reached end of replay");
                    return Err(StreamError::EndOfReplay { rows: self.table.len() });
                }
                EndPolicy::Cycle => {
                    debug!("Replay wrapped to row 0");
                    self.cursor = 0;
                    self.wraps += 1;
                }
            }
        }

        let index = self.cursor;
        self.cursor += 1;

        match self.table.row(index) {
            Some(TableRow::Values(values)) => {
                let frame = SampleFrame::from_microvolts(self.emitted, values)?;
                trace!("Replay row {}/{}", index + 1, self.table.len());
                self.emitted = self.emitted.wrapping_add(1);
                Ok(frame)
            }
            Some(TableRow::Malformed { line, details }) => {
                Err(StreamError::source_row(*line, details.clone()))
            }
            None => Err(StreamError::EndOfReplay { rows: self.table.len() }),
        }
    }

    fn tick_rate(&self) -> f64 {
        self.sample_rate * self.speed
    }

    fn channel_count(&self) -> usize {
        self.table.channels()
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.emitted = 0;
        self.wraps = 0;
    }

    fn wraps(&self) -> u64 {
        self.wraps
    }
}
