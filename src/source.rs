//! Source trait for sample generation

use crate::Result;
use crate::types::SampleFrame;

/// Producer of sample frames for the transmitter's pacing loop.
///
/// Sources abstract over synthetic generation and table replay. They never
/// sleep: the transmitter owns the sample clock and calls [`next_frame`]
/// exactly once per tick.
///
/// [`next_frame`]: SampleSource::next_frame
pub trait SampleSource: Send + 'static {
    /// Produce the frame for the current tick and advance.
    ///
    /// Returns:
    /// - `Ok(frame)` - Frame for this tick
    /// - `Err(StreamError::Source { .. })` - This tick's row was malformed and
    ///   skipped; the source has advanced and the next call continues
    /// - `Err(StreamError::EndOfReplay { .. })` - Finite source exhausted
    fn next_frame(&mut self) -> Result<SampleFrame>;

    /// Nominal emission rate in Hz
    fn tick_rate(&self) -> f64;

    /// Channels carried by every frame
    fn channel_count(&self) -> usize;

    /// Return to the start of the session
    fn reset(&mut self);

    /// Times a finite source has wrapped back to its first frame
    fn wraps(&self) -> u64 {
        0
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_frame(&mut self) -> Result<SampleFrame> {
        (**self).next_frame()
    }

    fn tick_rate(&self) -> f64 {
        (**self).tick_rate()
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn wraps(&self) -> u64 {
        (**self).wraps()
    }
}
