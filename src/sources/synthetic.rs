//! Synthetic multichannel waveform source

use tracing::{debug, trace};

use crate::source::SampleSource;
use crate::types::{ChannelParams, SampleFrame};
use crate::{Result, StreamError};

/// Generates per-channel waveforms as a pure function of the tick counter.
///
/// The only state is the monotonic tick counter; [`reset`](SampleSource::reset)
/// restarts the waveform from t = 0.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    channels: Vec<ChannelParams>,
    sample_rate: f64,
    tick: u64,
}

impl Synthesizer {
    /// Create a synthesizer, validating every channel and the sample rate.
    pub fn new(channels: Vec<ChannelParams>, sample_rate: f64) -> Result<Self> {
        if channels.is_empty() || channels.len() > crate::protocol::MAX_CHANNELS {
            return Err(StreamError::config(format!(
                "synthesizer needs 1..={} channels, got {}",
                crate::protocol::MAX_CHANNELS,
                channels.len()
            )));
        }
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StreamError::config(format!("sample rate {} must be positive", sample_rate)));
        }
        for (index, params) in channels.iter().enumerate() {
            params.validate(index)?;
        }

        debug!("Synthesizer configured: {} channels at {}Hz", channels.len(), sample_rate);
        Ok(Self { channels, sample_rate, tick: 0 })
    }

    /// `count` identical channels with default parameters.
    pub fn uniform(count: usize, params: ChannelParams, sample_rate: f64) -> Result<Self> {
        Self::new(vec![params; count], sample_rate)
    }

    /// Value of `channel` in microvolts at `tick`, or `None` for an unknown channel.
    pub fn value_at(&self, channel: usize, tick: u64) -> Option<f64> {
        let t = tick as f64 / self.sample_rate;
        self.channels.get(channel).map(|params| params.value_at(t))
    }

    /// Ticks produced since the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn channels(&self) -> &[ChannelParams] {
        &self.channels
    }
}

impl SampleSource for Synthesizer {
    fn next_frame(&mut self) -> Result<SampleFrame> {
        let t = self.tick as f64 / self.sample_rate;
        let values: Vec<f64> = self.channels.iter().map(|params| params.value_at(t)).collect();
        let frame = SampleFrame::from_microvolts(self.tick as u32, &values)?;

        trace!("Synthesized tick {}", self.tick);
        self.tick += 1;
        Ok(frame)
    }

    fn tick_rate(&self) -> f64 {
        self.sample_rate
    }

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn reset(&mut self) {
        self.tick = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Waveform, counts_to_microvolts};

    fn ten_microvolt_one_hz() -> Synthesizer {
        Synthesizer::new(vec![ChannelParams::sine(1.0, 10.0), ChannelParams::default()], 250.0)
            .unwrap()
    }

    #[test]
    fn starts_at_zero_and_peaks_at_quarter_period() {
        let synth = ten_microvolt_one_hz();
        assert!(synth.value_at(0, 0).unwrap().abs() < 1e-9);
        assert!((synth.value_at(0, 62).unwrap() - 10.0).abs() < 1e-2);
        assert!(synth.value_at(2, 0).is_none());
    }

    #[test]
    fn frames_follow_the_pure_function() {
        let mut synth = ten_microvolt_one_hz();
        let frames: Vec<_> = (0..63).map(|_| synth.next_frame().unwrap()).collect();

        assert_eq!(frames[0].samples()[0], 0);
        let quarter = counts_to_microvolts(frames[62].samples()[0]);
        assert!((quarter - 10.0).abs() < 1e-2, "got {}", quarter);
        assert_eq!(frames[62].sequence(), 62);
    }

    #[test]
    fn reset_restarts_the_waveform() {
        let mut synth = ten_microvolt_one_hz();
        let first = synth.next_frame().unwrap();
        for _ in 0..10 {
            synth.next_frame().unwrap();
        }
        synth.reset();
        assert_eq!(synth.tick(), 0);
        assert_eq!(synth.next_frame().unwrap(), first);
    }

    #[test]
    fn channels_are_independent() {
        let mut synth = Synthesizer::new(
            vec![
                ChannelParams::sine(5.0, 100.0),
                ChannelParams::sine(5.0, 100.0).with_phase(std::f64::consts::PI),
                ChannelParams::sine(20.0, 50.0).with_waveform(Waveform::Composite),
            ],
            250.0,
        )
        .unwrap();

        for _ in 0..50 {
            let frame = synth.next_frame().unwrap();
            let uv = frame.microvolts();
            // Opposite phase mirrors channel 0 within one count of rounding.
            assert!((uv[0] + uv[1]).abs() < 1e-3);
        }
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(Synthesizer::new(vec![], 250.0).is_err());
        assert!(Synthesizer::new(vec![ChannelParams::default()], 0.0).is_err());
        assert!(Synthesizer::new(vec![ChannelParams::default()], f64::NAN).is_err());
        assert!(Synthesizer::new(vec![ChannelParams::sine(500.0, 10.0)], 250.0).is_err());
    }
}
