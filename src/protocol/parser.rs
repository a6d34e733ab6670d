//! Incremental frame parser
//!
//! Consumes an arbitrary fragmentation of the byte stream and yields complete
//! frames. Holds only the residue that does not yet form a full packet; no
//! socket I/O happens here.

use tracing::{debug, trace};

use super::wire::{HEADER_SIZE, PacketHeader, SYNC, decode_packet};
use crate::types::SampleFrame;
use crate::{FramingError, Result};

/// Running counters for one parser session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Frames decoded successfully
    pub frames: u64,
    /// Candidate packets rejected by validation
    pub rejected: u64,
    /// Bytes skipped while hunting for a sync marker
    pub discarded_bytes: u64,
}

/// Stream parser with a partial-frame residue buffer.
#[derive(Debug, Default)]
pub struct FrameParser {
    residue: Vec<u8>,
    expected_channels: Option<usize>,
    stats: ParserStats,
}

impl FrameParser {
    /// Parser that rejects packets not carrying exactly `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self { expected_channels: Some(channels), ..Self::default() }
    }

    /// Parser that accepts any in-bound channel count.
    pub fn any_channel_count() -> Self {
        Self::default()
    }

    /// Append bytes and iterate over the frames they complete.
    ///
    /// The iterator yields `Err` for each rejected candidate packet after the
    /// parser has already resynchronized past it. Bytes left unconsumed when the
    /// iterator is dropped early stay in the residue for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> Frames<'_> {
        self.residue.extend_from_slice(bytes);
        Frames { parser: self }
    }

    /// Bytes currently buffered without forming a complete packet.
    pub fn residue_len(&self) -> usize {
        self.residue.len()
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Drop all buffered bytes and counters.
    pub fn reset(&mut self) {
        self.residue.clear();
        self.stats = ParserStats::default();
    }

    fn next_frame(&mut self) -> Option<Result<SampleFrame>> {
        let offset = match find_sync(&self.residue) {
            Some(offset) => offset,
            None => {
                // A trailing first sync byte may be completed by the next read.
                let keep = usize::from(self.residue.last() == Some(&SYNC[0]));
                let dropped = self.residue.len() - keep;
                if dropped > 0 {
                    trace!("No sync marker, discarding {} bytes", dropped);
                    self.stats.discarded_bytes += dropped as u64;
                    self.residue.drain(..dropped);
                }
                return None;
            }
        };

        if offset > 0 {
            trace!("Skipping {} bytes before sync marker", offset);
            self.stats.discarded_bytes += offset as u64;
            self.residue.drain(..offset);
        }

        if self.residue.len() < HEADER_SIZE {
            return None;
        }

        let header = match PacketHeader::parse(&self.residue[..HEADER_SIZE], self.expected_channels)
        {
            Ok(header) => header,
            Err(e) => return Some(Err(self.reject(e))),
        };

        let total = header.packet_len();
        if self.residue.len() < total {
            return None;
        }

        match decode_packet(&self.residue[..total], self.expected_channels) {
            Ok(frame) => {
                self.residue.drain(..total);
                self.stats.frames += 1;
                Some(Ok(frame))
            }
            Err(e) => Some(Err(self.reject(e))),
        }
    }

    /// Resynchronize one byte past a rejected candidate.
    fn reject(&mut self, error: FramingError) -> crate::StreamError {
        debug!("Rejected candidate packet: {}", error);
        self.stats.rejected += 1;
        self.stats.discarded_bytes += 1;
        self.residue.drain(..1);
        error.into()
    }
}

/// Lazy, finite iterator over frames completed by one [`FrameParser::feed`].
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
}

impl Iterator for Frames<'_> {
    type Item = Result<SampleFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_frame()
    }
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC.len()).position(|w| w == SYNC)
}
