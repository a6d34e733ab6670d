//! Session configuration
//!
//! Configuration is immutable for a session's lifetime: build a new
//! transmitter or receiver to apply changes. Both records load from YAML and
//! fall back to defaults for any omitted field.
//!
//! ```rust
//! use eeglink::config::{GeneratorConfig, SourceConfig};
//!
//! let config = GeneratorConfig::from_yaml_str(r#"
//! endpoint: { host: 127.0.0.1, port: 50012 }
//! channel_count: 2
//! sample_rate: 250
//! source:
//!   mode: synthetic
//!   channels:
//!     - { frequency: 10, amplitude: 50 }
//!     - { frequency: 12, amplitude: 40, waveform: composite }
//! "#).unwrap();
//! assert!(matches!(config.source, SourceConfig::Synthetic { .. }));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::protocol::MAX_CHANNELS;
use crate::receiver::BackoffPolicy;
use crate::replay::{ReplayTable, TableFormat};
use crate::source::SampleSource;
use crate::sources::{EndPolicy, ReplaySource, Synthesizer};
use crate::types::ChannelParams;
use crate::{Result, StreamError};

/// Default TCP port shared by generator and receiver
pub const DEFAULT_PORT: u16 = 50012;
/// Default channel count
pub const DEFAULT_CHANNELS: usize = 8;
/// Default sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: f64 = 250.0;

/// Network endpoint (host, port).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: DEFAULT_PORT }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where generated frames come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Per-channel waveforms; an empty list means defaults on every channel
    Synthetic {
        #[serde(default)]
        channels: Vec<ChannelParams>,
    },
    /// Rows replayed from a table file
    Replay {
        path: PathBuf,
        #[serde(default)]
        end_policy: EndPolicy,
        #[serde(default = "default_speed")]
        speed: f64,
        #[serde(default)]
        format: TableFormat,
    },
}

fn default_speed() -> f64 {
    1.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Synthetic { channels: Vec::new() }
    }
}

/// Transmitter (generator) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub endpoint: Endpoint,
    pub channel_count: usize,
    pub sample_rate: f64,
    pub source: SourceConfig,
    /// Upper bound on one packet write before the peer is treated as stalled
    pub write_timeout_ms: u64,
    pub event_capacity: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            channel_count: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            source: SourceConfig::default(),
            write_timeout_ms: 1000,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl GeneratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = parse_yaml(yaml, "generator config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml_str(&read_config(path.as_ref())?)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_channels(self.channel_count)?;
        validate_rate(self.sample_rate)?;
        if self.write_timeout_ms == 0 {
            return Err(StreamError::config("write_timeout_ms must be positive"));
        }
        match &self.source {
            SourceConfig::Synthetic { channels } => {
                if !channels.is_empty() && channels.len() != self.channel_count {
                    return Err(StreamError::config(format!(
                        "{} synthetic channel entries for channel_count {}",
                        channels.len(),
                        self.channel_count
                    )));
                }
                for (index, params) in channels.iter().enumerate() {
                    params.validate(index)?;
                }
            }
            SourceConfig::Replay { speed, .. } => {
                if !(speed.is_finite() && *speed > 0.0) {
                    return Err(StreamError::config(format!("replay speed {} must be positive", speed)));
                }
            }
        }
        Ok(())
    }

    /// Build the configured sample source, loading the replay table if needed.
    pub fn build_source(&self) -> Result<Box<dyn SampleSource>> {
        self.validate()?;
        match &self.source {
            SourceConfig::Synthetic { channels } => {
                let channels = if channels.is_empty() {
                    vec![ChannelParams::default(); self.channel_count]
                } else {
                    channels.clone()
                };
                Ok(Box::new(Synthesizer::new(channels, self.sample_rate)?))
            }
            SourceConfig::Replay { path, end_policy, speed, format } => {
                let table = ReplayTable::open(path, self.channel_count, *format)?;
                let source = ReplaySource::new(Arc::new(table), *end_policy, self.sample_rate)?
                    .with_speed(*speed);
                Ok(Box::new(source))
            }
        }
    }
}

/// Receiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub endpoint: Endpoint,
    pub channel_count: usize,
    /// Nominal rate of the incoming stream, used for subscriber throttling
    pub sample_rate: f64,
    pub backoff: BackoffPolicy,
    pub connect_timeout_ms: u64,
    pub read_buffer_size: usize,
    /// Frames a forwarder subscriber may lag before losing the oldest
    pub forward_capacity: usize,
    /// Optional JSON-lines push endpoint for downstream consumers
    pub forward: Option<Endpoint>,
    /// Optional WebSocket server (`ws://host:port`) that receives every frame
    pub websocket: Option<String>,
    pub event_capacity: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            channel_count: DEFAULT_CHANNELS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            backoff: BackoffPolicy::default(),
            connect_timeout_ms: 5000,
            read_buffer_size: 1024,
            forward_capacity: 1024,
            forward: None,
            websocket: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ReceiverConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = parse_yaml(yaml, "receiver config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml_str(&read_config(path.as_ref())?)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_channels(self.channel_count)?;
        validate_rate(self.sample_rate)?;
        self.backoff.validate()?;
        if self.connect_timeout_ms == 0 {
            return Err(StreamError::config("connect_timeout_ms must be positive"));
        }
        if self.read_buffer_size == 0 {
            return Err(StreamError::config("read_buffer_size must be positive"));
        }
        if self.forward_capacity == 0 {
            return Err(StreamError::config("forward_capacity must be positive"));
        }
        if let Some(url) = &self.websocket {
            crate::forwarder::validate_websocket_url(url)?;
        }
        Ok(())
    }
}

fn validate_channels(channels: usize) -> Result<()> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(StreamError::config(format!(
            "channel_count {} outside 1..={}",
            channels, MAX_CHANNELS
        )));
    }
    Ok(())
}

fn validate_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(StreamError::config(format!("sample_rate {} must be positive", rate)));
    }
    Ok(())
}

fn parse_yaml<T: serde::de::DeserializeOwned>(yaml: &str, context: &str) -> Result<T> {
    serde_yaml_ng::from_str(yaml)
        .map_err(|e| StreamError::Parse { context: context.to_string(), details: e.to_string() })
}

fn read_config(path: &Path) -> Result<String> {
    debug!("Reading configuration from {}", path.display());
    std::fs::read_to_string(path).map_err(|e| StreamError::file_error(path.to_path_buf(), e))
}
