//! Multi-channel EEG sample streaming over TCP.
//!
//! eeglink moves fixed-width multi-channel sample frames from a generator to a
//! receiver in real time, and republishes them to any number of local
//! consumers.
//!
//! # Features
//!
//! - **Synthesis and replay**: per-channel sine or composite waveforms, or rows
//!   replayed from a recorded table at 0.5x to 5x speed
//! - **Byte-exact framing**: a versioned packet format with checksum, and a
//!   parser that reassembles arbitrary fragments and resynchronizes after
//!   corruption
//! - **Drift-free pacing**: absolute-deadline scheduling at the configured rate
//! - **Resilient receiving**: unbounded reconnect with backoff, fresh parser
//!   state per session
//! - **Fan-out**: non-blocking broadcast with rate-limited subscriptions and a
//!   JSON-lines push transport
//!
//! Data flows `SampleSource → encode → Transmitter → TCP → Receiver →
//! FrameParser → Forwarder → subscribers`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use eeglink::{EegLink, GeneratorConfig, ReceiverConfig, UpdateRate};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> eeglink::Result<()> {
//!     let generator = GeneratorConfig::default();
//!     let mut transmitter = EegLink::serve(&generator, generator.build_source()?).await?;
//!
//!     let receiver = EegLink::receive(&ReceiverConfig::default())?;
//!     let mut frames = receiver.forwarder().subscribe(UpdateRate::Max(30));
//!
//!     if let Some(frame) = frames.next().await {
//!         println!("frame {}: {:?} uV", frame.sequence(), frame.microvolts());
//!     }
//!
//!     transmitter.stop().await;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
mod error;
pub mod events;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire format
pub mod protocol;

// Sample production
pub mod pacing;
pub mod replay;
pub mod source;
pub mod sources;

// Network roles
pub mod forwarder;
pub mod receiver;
pub mod stream;
pub mod transmitter;

// Core exports
pub use config::{Endpoint, GeneratorConfig, ReceiverConfig, SourceConfig};
pub use error::*;
pub use events::{EventBus, StreamEvent};
pub use types::*;

pub use forwarder::{ForwardMessage, Forwarder, JsonLinesSink, WebSocketPusher};
pub use protocol::{FrameParser, encode};
pub use receiver::{BackoffPolicy, Receiver, ReceiverState};
pub use source::SampleSource;
pub use sources::{EndPolicy, ReplaySource, Synthesizer};
pub use transmitter::{Transmitter, TransmitterState};

/// Unified entry point for both roles.
pub struct EegLink;

impl EegLink {
    /// Bind the generator endpoint and stream `source` to the first peer.
    pub async fn serve<S: SampleSource>(config: &GeneratorConfig, source: S) -> Result<Transmitter> {
        Transmitter::start(config, source).await
    }

    /// Build a TCP receiver and start connecting to the configured endpoint.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn receive(config: &ReceiverConfig) -> Result<Receiver> {
        let mut receiver = Receiver::new(config)?;
        receiver.connect(config.endpoint.clone())?;
        Ok(receiver)
    }
}
