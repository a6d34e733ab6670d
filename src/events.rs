//! Observable lifecycle events
//!
//! The core never touches display state. Everything a UI needs to react to
//! (connects, disconnects, reconnect attempts, parse errors, replay end) is
//! published here as a typed event.

use futures::{Stream, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

/// Default number of undelivered events retained per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event emitted by a transmitter or receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Transmitter bound its endpoint
    Listening { addr: SocketAddr },
    /// Transmitter accepted its single peer
    PeerConnected { peer: SocketAddr },
    /// Transmitter lost or released its peer
    PeerDisconnected { peer: SocketAddr, reason: String },
    /// Receiver is attempting a connection
    Connecting { endpoint: String, attempt: u32 },
    /// Receiver established a session
    Connected { endpoint: String },
    /// Receiver connection attempt failed
    ConnectFailed { endpoint: String, attempt: u32, reason: String },
    /// Receiver session ended
    Disconnected { reason: String },
    /// Receiver will retry after `delay`
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// A candidate packet was rejected
    ParseError { reason: String },
    /// A replay row was skipped
    SourceError { reason: String },
    /// Replay reached its last row under the stop policy
    ReplayEnded { rows: usize },
    /// Replay wrapped to its first row
    ReplayWrapped { wraps: u64 },
    /// Explicit stop or disconnect completed
    Stopped,
}

/// Fan-out of [`StreamEvent`]s to any number of subscribers.
///
/// Emission never blocks. A subscriber that falls behind loses the oldest
/// events rather than slowing the emitting loop.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error.
    pub fn emit(&self, event: StreamEvent) {
        trace!(?event, "event");
        let _ = self.tx.send(event);
    }

    /// Raw receiver, reporting lag explicitly.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Event stream that silently skips over lag.
    pub fn stream(&self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|item| async move { item.ok() })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
