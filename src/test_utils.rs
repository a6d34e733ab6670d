//! Shared fixtures for unit tests and benchmarks
//!
//! Builders for frames, encoded byte streams, replay tables and loopback
//! generator configurations, so that tests across modules agree on the same data.

#![cfg(any(test, feature = "benchmark"))]

use crate::config::{Endpoint, GeneratorConfig};
use crate::protocol::encode_into;
use crate::replay::{ReplayTable, TableFormat};
use crate::types::SampleFrame;

/// Generator config bound to an ephemeral loopback port.
pub fn loopback_generator_config(channels: usize, sample_rate: f64) -> GeneratorConfig {
    GeneratorConfig {
        endpoint: Endpoint::new("127.0.0.1", 0),
        channel_count: channels,
        sample_rate,
        ..GeneratorConfig::default()
    }
}

/// Parse an in-memory replay table with the default format.
///
/// # Panics
///
/// Panics if the text yields no usable rows.
pub fn replay_table(text: &str, channels: usize) -> ReplayTable {
    match ReplayTable::from_text(text, channels, TableFormat::default()) {
        Ok(table) => table,
        Err(e) => panic!("invalid replay fixture: {}", e),
    }
}

/// CSV text with a header and `rows` rows of a deterministic ramp.
pub fn ramp_table_text(rows: usize, channels: usize) -> String {
    let header: Vec<String> = (0..channels).map(|c| format!("ch{}", c + 1)).collect();
    let mut text = header.join(",");
    text.push('\n');
    for row in 0..rows {
        let values: Vec<String> =
            (0..channels).map(|c| format!("{:.3}", (row * channels + c) as f64 * 0.5)).collect();
        text.push_str(&values.join(","));
        text.push('\n');
    }
    text
}

/// Frames `0..count` with distinct, in-range samples on every channel.
pub fn sequential_frames(count: u32, channels: usize) -> Vec<SampleFrame> {
    (0..count)
        .map(|seq| {
            let samples = (0..channels)
                .map(|c| ((seq as i64 * 7919 + c as i64 * 104_729) % 8_000_000 - 4_000_000) as i32)
                .collect();
            match SampleFrame::new(seq, samples) {
                Ok(frame) => frame,
                Err(e) => panic!("fixture frame invalid: {}", e),
            }
        })
        .collect()
}

/// Concatenated wire encoding of `frames`.
pub fn encoded_stream(frames: &[SampleFrame]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        encode_into(frame, &mut out);
    }
    out
}
