//! Binary wire protocol between generator and receiver.
//!
//! One packet carries exactly one [`SampleFrame`](crate::types::SampleFrame).
//! The layout is a fixed, versioned contract (see [`wire`]); changing the
//! channel count or sample width is a breaking protocol change.
//!
//! - [`encode`] / [`encode_into`] serialize a frame, pure and deterministic.
//! - [`FrameParser`] reassembles frames from a fragmented byte stream and
//!   resynchronizes past corrupt input.
//!
//! ```rust
//! use eeglink::protocol::{FrameParser, encode};
//! use eeglink::types::SampleFrame;
//!
//! let frame = SampleFrame::new(42, vec![1, -2, 3]).unwrap();
//! let bytes = encode(&frame);
//!
//! let mut parser = FrameParser::new(3);
//! let decoded: Vec<_> = bytes.chunks(5).flat_map(|chunk| {
//!     parser.feed(chunk).collect::<Vec<_>>()
//! }).collect();
//! assert_eq!(decoded.len(), 1);
//! assert_eq!(decoded[0].as_ref().unwrap(), &frame);
//! ```

mod parser;
pub mod wire;

pub use parser::{FrameParser, Frames, ParserStats};
pub use wire::{
    FOOTER_SIZE, HEADER_SIZE, MAX_CHANNELS, MAX_PAYLOAD, PacketHeader, SAMPLE_MAX, SAMPLE_MIN,
    SAMPLE_WIDTH, SYNC, TRAILER, VERSION, decode_packet, encode, encode_into, packet_len,
};
