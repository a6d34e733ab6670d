//! Core types for multichannel sample representation.
//!
//! - [`SampleFrame`] is one simultaneous reading across C channels, tagged with
//!   a wrapping sequence index. Samples are signed 24-bit ADC counts.
//! - [`ChannelParams`] and [`Waveform`] describe one synthetic channel.
//! - [`UpdateRate`] controls how often forwarded frames reach a subscriber.
//!
//! ## Usage Example
//!
//! ```rust
//! use eeglink::types::{ChannelParams, SampleFrame};
//!
//! let params = ChannelParams::sine(10.0, 50.0);
//! let uv = params.value_at(0.025);
//! let frame = SampleFrame::from_microvolts(0, &[uv, 0.0]).unwrap();
//! assert_eq!(frame.channel_count(), 2);
//! ```

mod channel;
mod frame;
mod update_rate;

pub use channel::{AMPLITUDE_RANGE, ChannelParams, FREQUENCY_RANGE, Waveform};
pub use frame::{FULL_SCALE_MICROVOLTS, SampleFrame, counts_to_microvolts, microvolts_to_counts};
pub use update_rate::UpdateRate;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MAX_CHANNELS, SAMPLE_MAX, SAMPLE_MIN};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_valid_samples_always_construct(
            sequence in any::<u32>(),
            samples in prop::collection::vec(SAMPLE_MIN..=SAMPLE_MAX, 1..=MAX_CHANNELS)
        ) {
            let frame = SampleFrame::new(sequence, samples.clone()).unwrap();
            prop_assert_eq!(frame.sequence(), sequence);
            prop_assert_eq!(frame.samples(), samples.as_slice());
        }

        #[test]
        fn prop_microvolt_quantization_error_is_bounded(uv in -1000.0f64..1000.0f64) {
            let back = counts_to_microvolts(microvolts_to_counts(uv));
            // One count is ~1.2e-4 uV
            prop_assert!((back - uv).abs() < 2e-4);
        }
    }
}
