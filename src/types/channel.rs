//! Per-channel synthesis parameters

use serde::{Deserialize, Serialize};

use crate::{Result, StreamError};

/// Accepted frequency range in Hz.
pub const FREQUENCY_RANGE: (f64, f64) = (0.1, 100.0);

/// Accepted amplitude range in microvolts.
pub const AMPLITUDE_RANGE: (f64, f64) = (0.0, 1000.0);

/// Shape of a synthetic channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// `A·sin(2πft + φ)`
    #[default]
    Sine,

    /// Fundamental plus third and fifth harmonics at A/3 and A/5.
    Composite,
}

/// Frequency, amplitude and phase of one synthetic channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelParams {
    /// Frequency in Hz
    pub frequency: f64,
    /// Peak amplitude in microvolts
    pub amplitude: f64,
    /// Phase offset in radians
    pub phase: f64,
    pub waveform: Waveform,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self { frequency: 10.0, amplitude: 100.0, phase: 0.0, waveform: Waveform::Sine }
    }
}

impl ChannelParams {
    /// Pure sine channel with zero phase.
    pub fn sine(frequency: f64, amplitude: f64) -> Self {
        Self { frequency, amplitude, ..Self::default() }
    }

    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Value in microvolts at time `t` seconds.
    pub fn value_at(&self, t: f64) -> f64 {
        let angle = 2.0 * std::f64::consts::PI * self.frequency * t;
        match self.waveform {
            Waveform::Sine => self.amplitude * (angle + self.phase).sin(),
            Waveform::Composite => {
                self.amplitude * (angle + self.phase).sin()
                    + self.amplitude / 3.0 * (3.0 * angle + self.phase).sin()
                    + self.amplitude / 5.0 * (5.0 * angle + self.phase).sin()
            }
        }
    }

    /// Check parameters against the accepted ranges.
    pub fn validate(&self, channel: usize) -> Result<()> {
        let (f_min, f_max) = FREQUENCY_RANGE;
        if !(f_min..=f_max).contains(&self.frequency) {
            return Err(StreamError::config(format!(
                "channel {} frequency {} Hz outside [{}, {}]",
                channel, self.frequency, f_min, f_max
            )));
        }
        let (a_min, a_max) = AMPLITUDE_RANGE;
        if !(a_min..=a_max).contains(&self.amplitude) {
            return Err(StreamError::config(format!(
                "channel {} amplitude {} uV outside [{}, {}]",
                channel, self.amplitude, a_min, a_max
            )));
        }
        if !self.phase.is_finite() {
            return Err(StreamError::config(format!("channel {} phase is not finite", channel)));
        }
        Ok(())
    }
}
