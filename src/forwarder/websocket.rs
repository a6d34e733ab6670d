//! WebSocket push client for forwarded frames
//!
//! Connects out to a WebSocket server and sends every forwarded frame as one
//! JSON text message. Refused or lost connections are retried on a
//! [`BackoffPolicy`] for as long as the pusher runs; frames published while
//! disconnected are not queued.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::Forwarder;
use crate::receiver::BackoffPolicy;
use crate::types::UpdateRate;
use crate::{Result, StreamError};

/// Server the pusher targets when none is configured
pub const DEFAULT_WEBSOCKET_URL: &str = "ws://127.0.0.1:8765";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Snapshot of pusher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PusherStats {
    pub connected: bool,
    pub connects: u64,
    pub failed_attempts: u64,
    pub messages_sent: u64,
}

/// Pushes forwarded frames to a WebSocket server, reconnecting on loss.
pub struct WebSocketPusher {
    url: String,
    stats: watch::Receiver<PusherStats>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WebSocketPusher {
    /// Validate `url` and start pushing in the background.
    pub fn start(
        url: impl Into<String>,
        forwarder: Forwarder,
        rate: UpdateRate,
        backoff: BackoffPolicy,
    ) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;
        backoff.validate()?;

        let (stats_tx, stats) = watch::channel(PusherStats::default());
        let cancel = CancellationToken::new();
        let pusher = Pusher {
            url: url.clone(),
            forwarder,
            rate,
            backoff,
            stats: stats_tx,
            cancel: cancel.clone(),
        };
        info!("Pushing frames to {} ({:?})", url, rate);
        let task = tokio::spawn(pusher.run());

        Ok(Self { url, stats, cancel, task: Some(task) })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stats(&self) -> PusherStats {
        *self.stats.borrow()
    }

    /// Close the connection and stop reconnecting.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("WebSocket pusher task failed: {}", e);
            }
        }
    }
}

impl Drop for WebSocketPusher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) fn validate_url(url: &str) -> Result<()> {
    match url.strip_prefix("ws://") {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(StreamError::config(format!("websocket url {:?} must have the form ws://host:port", url))),
    }
}

enum PushEnd {
    Stopped,
    Lost(String),
}

struct Pusher {
    url: String,
    forwarder: Forwarder,
    rate: UpdateRate,
    backoff: BackoffPolicy,
    stats: watch::Sender<PusherStats>,
    cancel: CancellationToken,
}

impl Pusher {
    async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                connected = connect_async(self.url.as_str()) => connected,
            };

            match connected {
                Ok((socket, _response)) => {
                    failures = 0;
                    let end = self.push(socket).await;
                    self.stats.send_modify(|s| s.connected = false);
                    match end {
                        PushEnd::Stopped => break,
                        PushEnd::Lost(reason) => warn!("WebSocket {} lost: {}", self.url, reason),
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.stats.send_modify(|s| s.failed_attempts += 1);
                    warn!("WebSocket connect to {} failed: {}", self.url, e);
                }
            }

            let delay = self.backoff.delay(failures);
            debug!("Reconnecting to {} in {:?}", self.url, delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("WebSocket pusher for {} stopped", self.url);
    }

    async fn push(&self, socket: WebSocketStream<MaybeTlsStream<TcpStream>>) -> PushEnd {
        let (mut sink, mut inbound) = socket.split();
        // Subscribe before reporting the connection so no later frame is missed
        let mut messages = self.forwarder.messages(self.rate);
        self.stats.send_modify(|s| {
            s.connected = true;
            s.connects += 1;
        });
        info!("WebSocket connected: {}", self.url);

        let end = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break PushEnd::Stopped,
                incoming = inbound.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break PushEnd::Lost("closed by server".into()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break PushEnd::Lost(e.to_string()),
                },
                message = messages.next() => {
                    let Some(message) = message else {
                        break PushEnd::Stopped;
                    };
                    let text = match message.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Skipping frame {}: {}", message.sequence, e);
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        break PushEnd::Lost(e.to_string());
                    }
                    trace!("Pushed frame {}", message.sequence);
                    self.stats.send_modify(|s| s.messages_sent += 1);
                }
            }
        };

        if matches!(end, PushEnd::Stopped) {
            if let Err(e) = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
                debug!("WebSocket close to {} timed out: {}", self.url, e);
            }
        }
        end
    }
}
