//! EEG stream receiver
//!
//! Connects to a generator, reconnecting for as long as it runs, and republishes
//! parsed frames to local consumers over WebSocket or JSON lines.
//!
//! Usage:
//! ```bash
//! # Connect to 127.0.0.1:50012 and log connection events
//! eeg-receiver
//!
//! # Push every frame to the WebSocket server on ws://127.0.0.1:8765
//! eeg-receiver --websocket
//!
//! # Serve frames as JSON lines on port 8766, at most 30 per second
//! eeg-receiver --forward-port 8766 --forward-rate 30
//!
//! # Print every frame to stdout
//! eeg-receiver --print
//! ```

use anyhow::Context;
use clap::Parser;
use eeglink::config::{Endpoint, ReceiverConfig};
use eeglink::forwarder::DEFAULT_WEBSOCKET_URL;
use eeglink::{JsonLinesSink, Receiver, StreamEvent, UpdateRate, WebSocketPusher};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "eeg-receiver")]
#[command(about = "Receive EEG frames over TCP and forward them over WebSocket or JSON lines")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Generator host
    #[arg(long)]
    host: Option<String>,

    /// Generator port
    #[arg(short, long)]
    port: Option<u16>,

    /// Expected channels per frame
    #[arg(long)]
    channels: Option<usize>,

    /// Seconds between reconnect attempts
    #[arg(long)]
    retry_secs: Option<u64>,

    /// Push frames to this WebSocket server (ws://127.0.0.1:8765 when no URL is given)
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_WEBSOCKET_URL)]
    websocket: Option<String>,

    /// Serve JSON lines on this local port
    #[arg(long)]
    forward_port: Option<u16>,

    /// Maximum frames per second per forwarding consumer (0 = every frame)
    #[arg(long, default_value = "0")]
    forward_rate: u32,

    /// Print every frame to stdout as a JSON line
    #[arg(long)]
    print: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<(ReceiverConfig, UpdateRate, bool)> {
        let mut config = match &self.config {
            Some(path) => ReceiverConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ReceiverConfig::default(),
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
        if let Some(secs) = self.retry_secs {
            config.backoff = eeglink::BackoffPolicy::fixed(Duration::from_secs(secs));
        }
        if let Some(port) = self.forward_port {
            config.forward = Some(Endpoint::new("127.0.0.1", port));
        }
        if let Some(url) = self.websocket {
            config.websocket = Some(url);
        }

        config.validate().context("invalid receiver configuration")?;
        Ok((config, UpdateRate::Max(self.forward_rate), self.print))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (config, forward_rate, print) = Args::parse().into_config()?;
    info!("Receiver: {} channels from {}", config.channel_count, config.endpoint);

    let mut receiver = Receiver::new(&config)?;

    let mut sink = match &config.forward {
        Some(endpoint) => Some(
            JsonLinesSink::bind(endpoint, receiver.forwarder().clone(), forward_rate)
                .await
                .with_context(|| format!("binding forward endpoint {}", endpoint))?,
        ),
        None => None,
    };

    let mut pusher = match &config.websocket {
        Some(url) => Some(
            WebSocketPusher::start(url.as_str(), receiver.forwarder().clone(), forward_rate, config.backoff)
                .with_context(|| format!("starting WebSocket push to {}", url))?,
        ),
        None => None,
    };

    let mut events = receiver.events().stream().boxed();
    let log_events = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match &event {
                StreamEvent::ConnectFailed { reason, attempt, .. } => {
                    warn!("Connect attempt {} failed: {}", attempt, reason)
                }
                StreamEvent::ParseError { reason } => debug!("Dropped packet: {}", reason),
                other => info!("{:?}", other),
            }
        }
    });

    receiver.connect(config.endpoint.clone())?;

    let printer = print.then(|| {
        let mut messages = receiver.forwarder().messages(UpdateRate::Native);
        tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                match message.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!("{}", e),
                }
            }
        })
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");

    receiver.disconnect().await;
    if let Some(sink) = sink.as_mut() {
        sink.shutdown().await;
    }
    if let Some(pusher) = pusher.as_mut() {
        pusher.shutdown().await;
        let pushed = pusher.stats();
        info!("Pushed {} frames over {} WebSocket connections", pushed.messages_sent, pushed.connects);
    }
    if let Some(printer) = printer {
        printer.abort();
    }
    log_events.abort();

    let parsed = receiver.parser_stats();
    let forwarded = receiver.forwarder().stats();
    info!(
        "Last session: {} frames, {} rejected packets, {} discarded bytes; {} frames dropped by slow consumers",
        parsed.frames, parsed.rejected, parsed.discarded_bytes, forwarded.dropped
    );
    Ok(())
}
