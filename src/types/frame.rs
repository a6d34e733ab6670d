//! Sample frame, the unit of transfer

use serde::{Deserialize, Serialize};

use crate::protocol::{MAX_CHANNELS, SAMPLE_MAX, SAMPLE_MIN};
use crate::{Result, StreamError};

/// Full-scale input range in microvolts, mapped onto the 24-bit sample range.
pub const FULL_SCALE_MICROVOLTS: f64 = 1000.0;

/// Convert microvolts to 24-bit ADC counts, clamping to the representable range.
pub fn microvolts_to_counts(microvolts: f64) -> i32 {
    if !microvolts.is_finite() {
        return 0;
    }
    let counts = (microvolts / FULL_SCALE_MICROVOLTS * SAMPLE_MAX as f64).trunc();
    counts.clamp(SAMPLE_MIN as f64, SAMPLE_MAX as f64) as i32
}

/// Convert 24-bit ADC counts to microvolts.
pub fn counts_to_microvolts(counts: i32) -> f64 {
    counts as f64 * FULL_SCALE_MICROVOLTS / SAMPLE_MAX as f64
}

/// One simultaneous reading across all channels.
///
/// Samples are ADC counts in the signed 24-bit range. The channel count is
/// fixed at construction and never changes for a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFrame {
    sequence: u32,
    samples: Vec<i32>,
}

impl SampleFrame {
    /// Create a frame, validating channel count and sample range.
    pub fn new(sequence: u32, samples: Vec<i32>) -> Result<Self> {
        if samples.is_empty() || samples.len() > MAX_CHANNELS {
            return Err(StreamError::config(format!(
                "frame must carry 1..={} channels, got {}",
                MAX_CHANNELS,
                samples.len()
            )));
        }
        if let Some((channel, value)) =
            samples.iter().enumerate().find(|(_, v)| !(SAMPLE_MIN..=SAMPLE_MAX).contains(*v))
        {
            return Err(StreamError::config(format!(
                "channel {} sample {} outside 24-bit range",
                channel, value
            )));
        }
        Ok(Self { sequence, samples })
    }

    /// Build a frame from microvolt readings, quantizing each to counts.
    pub fn from_microvolts(sequence: u32, microvolts: &[f64]) -> Result<Self> {
        Self::new(sequence, microvolts.iter().copied().map(microvolts_to_counts).collect())
    }

    /// Decoder-side constructor; the codec guarantees range and count.
    pub(crate) fn from_decoded(sequence: u32, samples: Vec<i32>) -> Self {
        Self { sequence, samples }
    }

    /// Monotonic (wrapping) sequence index within the session.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Number of channels carried.
    pub fn channel_count(&self) -> usize {
        self.samples.len()
    }

    /// Raw samples in channel-index order.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Samples converted to microvolts.
    pub fn microvolts(&self) -> Vec<f64> {
        self.samples.iter().copied().map(counts_to_microvolts).collect()
    }
}
