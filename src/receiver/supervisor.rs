//! Connect/read/reconnect loop

use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::state::{BackoffPolicy, ReceiverInput, ReceiverState};
use super::transport::Transport;
use crate::config::Endpoint;
use crate::events::{EventBus, StreamEvent};
use crate::forwarder::Forwarder;
use crate::protocol::{FrameParser, ParserStats};

/// How an established session ended.
enum SessionEnd {
    Cancelled,
    Lost(String),
}

/// Owns the reconnect loop for one `connect()` call.
pub(crate) struct Supervisor<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) endpoint: Endpoint,
    pub(crate) policy: BackoffPolicy,
    pub(crate) channels: usize,
    pub(crate) read_buffer_size: usize,
    pub(crate) state: Arc<watch::Sender<ReceiverState>>,
    pub(crate) parser_stats: Arc<watch::Sender<ParserStats>>,
    pub(crate) forwarder: Forwarder,
    pub(crate) events: EventBus,
    pub(crate) cancel: CancellationToken,
}

impl<T: Transport> Supervisor<T> {
    pub(crate) async fn run(self) {
        info!("Receiver supervising connection to {}", self.endpoint);
        let mut state = self.transition(ReceiverInput::ConnectRequested);

        loop {
            match state {
                ReceiverState::Connecting { attempt } => {
                    state = self.attempt(attempt).await;
                }
                ReceiverState::Backoff { attempt } => {
                    let delay = self.policy.delay(attempt);
                    debug!("Reconnecting to {} in {:?}", self.endpoint, delay);
                    self.events.emit(StreamEvent::ReconnectScheduled {
                        attempt: attempt.saturating_add(1),
                        delay,
                    });

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    state = self.transition(ReceiverInput::BackoffElapsed);
                }
                ReceiverState::Disconnected | ReceiverState::Connected => break,
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.transition(ReceiverInput::DisconnectRequested);
        self.events.emit(StreamEvent::Stopped);
        info!("Receiver stopped");
    }

    /// One connection attempt plus, on success, the whole session.
    async fn attempt(&self, attempt: u32) -> ReceiverState {
        let endpoint = self.endpoint.to_string();
        debug!("Connecting to {} (attempt {})", endpoint, attempt);
        self.events.emit(StreamEvent::Connecting { endpoint: endpoint.clone(), attempt });

        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return self.current(),
            connected = self.transport.connect(&self.endpoint) => connected,
        };

        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Connection to {} failed (attempt {}): {}", endpoint, attempt, e);
                self.events.emit(StreamEvent::ConnectFailed {
                    endpoint,
                    attempt,
                    reason: e.to_string(),
                });
                return self.transition(ReceiverInput::ConnectFailed);
            }
        };

        info!("Connected to {}", endpoint);
        self.transition(ReceiverInput::ConnectSucceeded);
        self.events.emit(StreamEvent::Connected { endpoint: endpoint.clone() });

        match self.session(stream).await {
            SessionEnd::Cancelled => self.current(),
            SessionEnd::Lost(reason) => {
                warn!("Connection to {} lost: {}", endpoint, reason);
                self.events.emit(StreamEvent::Disconnected { reason });
                self.transition(ReceiverInput::ConnectionLost)
            }
        }
    }

    /// Read loop for one session. The parser, and with it any partial packet,
    /// lives only as long as this call.
    async fn session(&self, mut stream: T::Stream) -> SessionEnd {
        let mut parser = FrameParser::new(self.channels);
        let mut buf = vec![0u8; self.read_buffer_size];
        self.parser_stats.send_replace(ParserStats::default());

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                read = stream.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => return SessionEnd::Lost("connection closed by peer".to_string()),
                Ok(n) => n,
                Err(e) => return SessionEnd::Lost(format!("read failed: {}", e)),
            };
            trace!("Read {} bytes", n);

            for result in parser.feed(&buf[..n]) {
                match result {
                    Ok(frame) => self.forwarder.publish(frame),
                    Err(e) => {
                        debug!("Rejected packet: {}", e);
                        self.events.emit(StreamEvent::ParseError { reason: e.to_string() });
                    }
                }
            }
            self.parser_stats.send_replace(parser.stats());
        }
    }

    fn current(&self) -> ReceiverState {
        *self.state.borrow()
    }

    fn transition(&self, input: ReceiverInput) -> ReceiverState {
        let from = self.current();
        let to = from.on(input);
        if from != to {
            debug!("Receiver {} -> {} ({:?})", from, to, input);
            self.state.send_replace(to);
        }
        to
    }
}
