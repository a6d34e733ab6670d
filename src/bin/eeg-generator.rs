//! EEG stream generator
//!
//! Synthesizes (or replays) multi-channel frames and streams them in real time
//! to one receiver.
//!
//! Usage:
//! ```bash
//! # Eight channels of 10 Hz sine at 250 Hz on 127.0.0.1:50012
//! eeg-generator
//!
//! # Replay a recording twice as fast, stopping at the end
//! eeg-generator --replay session.csv --speed 2 --once
//!
//! # Everything from a config file, serving peer after peer
//! eeg-generator --config generator.yaml --relisten
//! ```

use anyhow::Context;
use clap::Parser;
use eeglink::config::{GeneratorConfig, SourceConfig};
use eeglink::sources::EndPolicy;
use eeglink::{EegLink, StreamEvent};
use futures::StreamExt;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "eeg-generator")]
#[command(about = "Stream synthetic or recorded EEG frames over TCP")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to listen on
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of channels per frame
    #[arg(long)]
    channels: Option<usize>,

    /// Sample rate in Hz
    #[arg(long)]
    rate: Option<f64>,

    /// Replay a recorded table instead of synthesizing
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay speed multiplier (0.5 to 5.0)
    #[arg(long)]
    speed: Option<f64>,

    /// Stop at the end of the replay table instead of looping
    #[arg(long)]
    once: bool,

    /// Listen for a new peer after each session ends
    #[arg(long)]
    relisten: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(GeneratorConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => GeneratorConfig::default(),
        };

        if let Some(host) = self.host {
            config.endpoint.host = host;
        }
        if let Some(port) = self.port {
            config.endpoint.port = port;
        }
        if let Some(channels) = self.channels {
            config.channel_count = channels;
        }
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if let Some(path) = self.replay {
            config.source = SourceConfig::Replay {
                path,
                end_policy: EndPolicy::Cycle,
                speed: 1.0,
                format: Default::default(),
            };
        }
        if let SourceConfig::Replay { speed, end_policy, .. } = &mut config.source {
            if let Some(requested) = self.speed {
                *speed = requested;
            }
            if self.once {
                *end_policy = EndPolicy::Stop;
            }
        }

        config.validate().context("invalid generator configuration")?;
        Ok((config, self.relisten))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (config, relisten) = Args::parse().into_config()?;
    info!(
        "Generator: {} channels at {} Hz on {}",
        config.channel_count, config.sample_rate, config.endpoint
    );

    loop {
        // Each session starts from the first sample
        let source = config.build_source().context("building sample source")?;
        let mut transmitter = EegLink::serve(&config, source)
            .await
            .with_context(|| format!("starting transmitter on {}", config.endpoint))?;

        let mut events = transmitter.events().stream().boxed();
        let log_events = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match &event {
                    StreamEvent::SourceError { reason } => warn!("{}", reason),
                    StreamEvent::PeerConnected { peer } => info!("Streaming to {}", peer),
                    other => info!("{:?}", other),
                }
            }
        });

        let interrupted = tokio::select! {
            _ = tokio::signal::ctrl_c() => true,
            outcome = transmitter.wait() => {
                if let Err(e) = outcome {
                    warn!("Session ended: {}", e);
                    for suggestion in e.recovery_suggestions() {
                        info!("  - {}", suggestion);
                    }
                }
                false
            }
        };

        let stats = transmitter.stop().await;
        drop(transmitter);
        log_events.abort();
        info!(
            "Sent {} frames ({} bytes, {} skipped rows)",
            stats.frames_sent, stats.bytes_sent, stats.source_errors
        );

        if interrupted || !relisten {
            break;
        }
    }

    Ok(())
}
