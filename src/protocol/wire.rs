//! Wire format v1 constants, header parsing and packet encoding
//!
//! ## Packet Layout
//!
//! All multi-byte integers are little-endian.
//!
//! ```text
//! offset   size  field
//! 0        2     sync marker 0xA0 0xFF
//! 2        1     version/type 0x01
//! 3        2     payload length (u16) = 3 * C
//! 5        4     sequence (u32, wrapping)
//! 9        3*C   samples, signed 24-bit two's complement, channel order
//! 9+3C     1     checksum: XOR of bytes [2, 9+3C)
//! 10+3C    2     trailer 0xC0 0x00
//! ```
//!
//! Total length is `12 + 3 * C`, computable from the header alone.

use crate::FramingError;
use crate::types::SampleFrame;

/// Sync marker opening every packet
pub const SYNC: [u8; 2] = [0xA0, 0xFF];
/// Version/type byte for EEG sample packets
pub const VERSION: u8 = 0x01;
/// Trailer closing every packet
pub const TRAILER: [u8; 2] = [0xC0, 0x00];

/// Bytes per encoded sample
pub const SAMPLE_WIDTH: usize = 3;
/// Largest channel count the protocol accepts
pub const MAX_CHANNELS: usize = 64;
/// Largest declared payload length
pub const MAX_PAYLOAD: u16 = (MAX_CHANNELS * SAMPLE_WIDTH) as u16;

/// Sync + version + length + sequence
pub const HEADER_SIZE: usize = 9;
/// Checksum + trailer
pub const FOOTER_SIZE: usize = 3;

/// Smallest 24-bit sample
pub const SAMPLE_MIN: i32 = -(1 << 23);
/// Largest 24-bit sample
pub const SAMPLE_MAX: i32 = (1 << 23) - 1;

/// Total encoded size for `channels` channels.
pub const fn packet_len(channels: usize) -> usize {
    HEADER_SIZE + channels * SAMPLE_WIDTH + FOOTER_SIZE
}

/// Parsed packet header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    pub payload_len: u16,
    pub sequence: u32,
}

impl PacketHeader {
    /// Parse and bound-check a header.
    ///
    /// `bytes` must start at the sync marker; anything shorter than
    /// [`HEADER_SIZE`] is reported as truncated. When `expected_channels` is
    /// set, any other declared count is rejected without waiting for the
    /// payload.
    pub fn parse(bytes: &[u8], expected_channels: Option<usize>) -> Result<Self, FramingError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FramingError::Truncated { needed: HEADER_SIZE, found: bytes.len() });
        }
        if bytes[..2] != SYNC {
            return Err(FramingError::MissingSync { found_0: bytes[0], found_1: bytes[1] });
        }

        if bytes[2] != VERSION {
            return Err(FramingError::UnsupportedVersion { found: bytes[2] });
        }

        let payload_len = u16::from_le_bytes([bytes[3], bytes[4]]);
        if payload_len == 0
            || payload_len > MAX_PAYLOAD
            || payload_len as usize % SAMPLE_WIDTH != 0
        {
            return Err(FramingError::LengthOutOfBounds {
                declared: payload_len,
                maximum: MAX_PAYLOAD,
            });
        }

        let header = Self {
            payload_len,
            sequence: u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]),
        };

        if let Some(expected) = expected_channels {
            if header.channel_count() != expected {
                return Err(FramingError::ChannelCountMismatch {
                    expected,
                    found: header.channel_count(),
                });
            }
        }

        Ok(header)
    }

    pub fn channel_count(&self) -> usize {
        self.payload_len as usize / SAMPLE_WIDTH
    }

    /// Total packet length declared by this header.
    pub fn packet_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize + FOOTER_SIZE
    }
}

/// XOR checksum over a byte range.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Write a signed 24-bit sample as three little-endian bytes.
pub fn write_i24_le(value: i32, out: &mut Vec<u8>) {
    let bytes = value.to_le_bytes();
    out.extend_from_slice(&bytes[..3]);
}

/// Read a signed 24-bit little-endian sample, sign-extending to i32.
pub fn read_i24_le(bytes: &[u8]) -> i32 {
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
    (raw << 8) >> 8
}

/// Encode one frame into a freshly allocated packet.
pub fn encode(frame: &SampleFrame) -> Vec<u8> {
    let mut out = Vec::with_capacity(packet_len(frame.channel_count()));
    encode_into(frame, &mut out);
    out
}

/// Encode one frame, appending to `out`.
///
/// Reusing `out` across calls keeps the pacing loop allocation-free.
pub fn encode_into(frame: &SampleFrame, out: &mut Vec<u8>) {
    let start = out.len();
    let payload_len = (frame.channel_count() * SAMPLE_WIDTH) as u16;

    out.extend_from_slice(&SYNC);
    out.push(VERSION);
    out.extend_from_slice(&payload_len.to_le_bytes());
    out.extend_from_slice(&frame.sequence().to_le_bytes());
    for &sample in frame.samples() {
        write_i24_le(sample, out);
    }
    let sum = checksum(&out[start + SYNC.len()..]);
    out.push(sum);
    out.extend_from_slice(&TRAILER);
}

/// Decode exactly one complete packet.
///
/// `packet` must start at the sync marker and hold at least the length the
/// header declares. Nothing beyond that length is inspected.
pub fn decode_packet(
    packet: &[u8],
    expected_channels: Option<usize>,
) -> Result<SampleFrame, FramingError> {
    let header = PacketHeader::parse(packet, expected_channels)?;
    if packet.len() < header.packet_len() {
        return Err(FramingError::Truncated { needed: header.packet_len(), found: packet.len() });
    }

    let payload_end = HEADER_SIZE + header.payload_len as usize;
    let computed = checksum(&packet[SYNC.len()..payload_end]);
    let expected = packet[payload_end];
    if computed != expected {
        return Err(FramingError::ChecksumMismatch { expected, computed });
    }

    let trailer = &packet[payload_end + 1..payload_end + 3];
    if trailer != TRAILER {
        return Err(FramingError::InvalidTrailer { found_0: trailer[0], found_1: trailer[1] });
    }

    let samples = packet[HEADER_SIZE..payload_end].chunks_exact(SAMPLE_WIDTH).map(read_i24_le).collect();

    Ok(SampleFrame::from_decoded(header.sequence, samples))
}
