//! Stream receiver
//!
//! Connects to a transmitter, parses the byte stream into frames and hands
//! each frame to a [`Forwarder`]. Connection loss never surfaces as an error:
//! the receiver waits out its [`BackoffPolicy`] and tries again, without
//! limit, until [`Receiver::disconnect`] is called.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!       ▲                     │    ▲               │
//!       │                fail │    │ delay         │ read error / EOF
//!       │                     ▼    │               ▼
//!       └──disconnect───── Backoff ◀───────────────┘
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use eeglink::config::ReceiverConfig;
//! use eeglink::receiver::Receiver;
//! use eeglink::types::UpdateRate;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> eeglink::Result<()> {
//!     let config = ReceiverConfig::default();
//!     let mut receiver = Receiver::new(&config)?;
//!     let mut frames = receiver.forwarder().subscribe(UpdateRate::Max(30));
//!     receiver.connect(config.endpoint.clone())?;
//!
//!     while let Some(frame) = frames.next().await {
//!         println!("{} {:?}", frame.sequence(), frame.microvolts());
//!     }
//!     Ok(())
//! }
//! ```

mod state;
mod supervisor;
mod transport;

#[cfg(test)]
mod tests;

pub use state::{BackoffPolicy, ReceiverInput, ReceiverState};
pub use transport::{TcpTransport, Transport};

use futures::Stream;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{Endpoint, ReceiverConfig};
use crate::events::EventBus;
use crate::forwarder::Forwarder;
use crate::protocol::ParserStats;
use crate::{Result, StreamError};
use supervisor::Supervisor;

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Receiver handle.
///
/// Dropping the handle cancels any running connection loop.
pub struct Receiver<T: Transport = TcpTransport> {
    config: ReceiverConfig,
    transport: Arc<T>,
    forwarder: Forwarder,
    events: EventBus,
    state_tx: Arc<watch::Sender<ReceiverState>>,
    state: watch::Receiver<ReceiverState>,
    parser_stats_tx: Arc<watch::Sender<ParserStats>>,
    parser_stats: watch::Receiver<ParserStats>,
    running: Option<Running>,
}

impl Receiver<TcpTransport> {
    /// Receiver over TCP using the configured connect timeout.
    pub fn new(config: &ReceiverConfig) -> Result<Self> {
        Self::with_transport(config, TcpTransport::new(config.connect_timeout()))
    }
}

impl<T: Transport> Receiver<T> {
    pub fn with_transport(config: &ReceiverConfig, transport: T) -> Result<Self> {
        config.validate()?;

        let (state_tx, state) = watch::channel(ReceiverState::Disconnected);
        let (parser_stats_tx, parser_stats) = watch::channel(ParserStats::default());

        Ok(Self {
            config: config.clone(),
            transport: Arc::new(transport),
            forwarder: Forwarder::new(config.forward_capacity, config.sample_rate),
            events: EventBus::new(config.event_capacity),
            state_tx: Arc::new(state_tx),
            state,
            parser_stats_tx: Arc::new(parser_stats_tx),
            parser_stats,
            running: None,
        })
    }

    /// Start connecting to `endpoint`, retrying until [`disconnect`](Self::disconnect).
    ///
    /// Returns immediately; progress is visible through [`state`](Self::state)
    /// and [`events`](Self::events). Fails only if a connection loop is already
    /// running or the endpoint is unusable.
    pub fn connect(&mut self, endpoint: Endpoint) -> Result<()> {
        if let Some(running) = &self.running {
            if !running.task.is_finished() {
                return Err(StreamError::invalid_state("connect", self.state().to_string()));
            }
        }
        if endpoint.host.trim().is_empty() {
            return Err(StreamError::config("endpoint host is empty"));
        }

        let cancel = CancellationToken::new();
        let supervisor = Supervisor {
            transport: Arc::clone(&self.transport),
            endpoint,
            policy: self.config.backoff,
            channels: self.config.channel_count,
            read_buffer_size: self.config.read_buffer_size,
            state: Arc::clone(&self.state_tx),
            parser_stats: Arc::clone(&self.parser_stats_tx),
            forwarder: self.forwarder.clone(),
            events: self.events.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());
        self.running = Some(Running { cancel, task });
        Ok(())
    }

    /// Tear down the connection and suppress reconnects until the next
    /// [`connect`](Self::connect). The socket is closed when this returns.
    pub async fn disconnect(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Disconnect requested while not connected");
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            error!("Receiver task failed: {}", e);
            self.state_tx.send_replace(ReceiverState::Disconnected);
        }
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.borrow()
    }

    /// Stream of state changes, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = ReceiverState> + 'static {
        WatchStream::new(self.state.clone())
    }

    /// Parser counters for the current (or last) session
    pub fn parser_stats(&self) -> ParserStats {
        *self.parser_stats.borrow()
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }
}

impl<T: Transport> Drop for Receiver<T> {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            debug!("Dropping receiver");
            running.cancel.cancel();
        }
    }
}
