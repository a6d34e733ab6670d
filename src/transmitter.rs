//! Stream transmitter
//!
//! Owns the listening endpoint, accepts exactly one peer per session, and
//! writes one encoded packet per sample-clock tick until the peer leaves, the
//! source is exhausted, or [`Transmitter::stop`] is called.
//!
//! ```text
//! Idle ──start──▶ Listening ──accept──▶ Connected ──loop──▶ Streaming
//!                     │                     │                   │
//!                     └──stop───────────────┴──peer gone / stop─┴──▶ Closed
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use eeglink::config::GeneratorConfig;
//! use eeglink::transmitter::Transmitter;
//!
//! #[tokio::main]
//! async fn main() -> eeglink::Result<()> {
//!     let config = GeneratorConfig::default();
//!     let source = config.build_source()?;
//!     let mut transmitter = Transmitter::start(&config, source).await?;
//!     println!("listening on {}", transmitter.local_addr());
//!
//!     tokio::signal::ctrl_c().await.ok();
//!     let stats = transmitter.stop().await;
//!     println!("sent {} frames", stats.frames_sent);
//!     Ok(())
//! }
//! ```

use futures::Stream;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::GeneratorConfig;
use crate::events::{EventBus, StreamEvent};
use crate::pacing::Pacer;
use crate::protocol::{encode_into, packet_len};
use crate::source::SampleSource;
use crate::{Result, StreamError};

/// Transmitter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitterState {
    Idle,
    Listening,
    Connected,
    Streaming,
    Closed,
}

impl fmt::Display for TransmitterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransmitterState::Idle => "idle",
            TransmitterState::Listening => "listening",
            TransmitterState::Connected => "connected",
            TransmitterState::Streaming => "streaming",
            TransmitterState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitterStats {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub source_errors: u64,
}

/// Why a streaming session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    PeerClosed,
    ReplayEnded,
}

impl SessionEnd {
    fn reason(self) -> &'static str {
        match self {
            SessionEnd::Stopped => "stopped",
            SessionEnd::PeerClosed => "peer closed connection",
            SessionEnd::ReplayEnded => "replay ended",
        }
    }
}

/// Handle to a running transmitter session.
///
/// Dropping the handle cancels the session; call [`stop`](Self::stop) to also
/// wait until the socket is released.
pub struct Transmitter {
    local_addr: SocketAddr,
    state: watch::Receiver<TransmitterState>,
    stats: watch::Receiver<TransmitterStats>,
    events: EventBus,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl Transmitter {
    /// Bind the configured endpoint and start waiting for a peer.
    ///
    /// Fails with [`StreamError::Bind`] when the port is unavailable and with
    /// [`StreamError::Config`] when the source does not match the configuration.
    pub async fn start<S>(config: &GeneratorConfig, source: S) -> Result<Self>
    where
        S: SampleSource,
    {
        Self::start_with_events(config, source, EventBus::new(config.event_capacity)).await
    }

    /// Like [`start`](Self::start), publishing to an existing event bus so that
    /// subscribers see the `Listening` event.
    pub async fn start_with_events<S>(
        config: &GeneratorConfig,
        source: S,
        events: EventBus,
    ) -> Result<Self>
    where
        S: SampleSource,
    {
        config.validate()?;
        if source.channel_count() != config.channel_count {
            return Err(StreamError::config(format!(
                "source produces {} channels, session is configured for {}",
                source.channel_count(),
                config.channel_count
            )));
        }

        let (state_tx, state_rx) = watch::channel(TransmitterState::Idle);
        let (stats_tx, stats_rx) = watch::channel(TransmitterStats::default());

        let addr = config.endpoint.to_string();
        let listener =
            TcpListener::bind(&addr).await.map_err(|e| StreamError::bind_failed(addr.clone(), e))?;
        let local_addr =
            listener.local_addr().map_err(|e| StreamError::bind_failed(addr.clone(), e))?;

        info!("Transmitter listening on {} ({} channels)", local_addr, config.channel_count);
        state_tx.send_replace(TransmitterState::Listening);
        events.emit(StreamEvent::Listening { addr: local_addr });

        let cancel = CancellationToken::new();
        let session = Session {
            source,
            write_timeout: config.write_timeout(),
            state: state_tx,
            stats: stats_tx,
            events: events.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(session.run(listener));

        Ok(Self {
            local_addr,
            state: state_rx,
            stats: stats_rx,
            events,
            cancel,
            task: Some(task),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> TransmitterState {
        *self.state.borrow()
    }

    /// Stream of state changes, starting with the current state
    pub fn state_updates(&self) -> impl Stream<Item = TransmitterState> + 'static {
        WatchStream::new(self.state.clone())
    }

    pub fn stats(&self) -> TransmitterStats {
        *self.stats.borrow()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Wait for the session to end on its own and return its outcome.
    ///
    /// Returns `Ok` for a clean end (peer closed, replay ended, stopped) and
    /// the write or source error otherwise.
    /// Cancel-safe: if the returned future is dropped, [`stop`](Self::stop)
    /// still joins the session.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let joined = task.await;
        self.task = None;
        match joined {
            Ok(result) => result,
            Err(e) => Err(StreamError::invalid_state("wait", format!("session task failed: {}", e))),
        }
    }

    /// Stop streaming and release the socket.
    ///
    /// When this returns the peer socket and listener are closed and no further
    /// packet will be written.
    pub async fn stop(&mut self) -> TransmitterStats {
        debug!("Stopping transmitter on {}", self.local_addr);
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Transmitter session ended with error: {}", e),
                Err(e) => error!("Transmitter session task failed: {}", e),
            }
        }

        self.stats()
    }
}

impl Drop for Transmitter {
    fn drop(&mut self) {
        debug!("Dropping transmitter");
        self.cancel.cancel();
    }
}

/// Everything the session task owns.
struct Session<S> {
    source: S,
    write_timeout: Duration,
    state: watch::Sender<TransmitterState>,
    stats: watch::Sender<TransmitterStats>,
    events: EventBus,
    cancel: CancellationToken,
}

impl<S: SampleSource> Session<S> {
    async fn run(mut self, listener: TcpListener) -> Result<()> {
        let accepted = tokio::select! {
            _ = self.cancel.cancelled() => None,
            accepted = listener.accept() => Some(accepted),
        };
        // One peer per session
        drop(listener);

        let (mut socket, peer) = match accepted {
            None => {
                info!("Transmitter stopped before a peer connected");
                self.close(None);
                return Ok(());
            }
            Some(Ok(pair)) => pair,
            Some(Err(e)) => {
                error!("Accept failed: {}", e);
                self.close(None);
                return Err(StreamError::Read { source: e });
            }
        };

        info!("Peer connected: {}", peer);
        if let Err(e) = socket.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }
        self.state.send_replace(TransmitterState::Connected);
        self.events.emit(StreamEvent::PeerConnected { peer });

        let result = self.stream(&mut socket).await;

        if let Err(e) = socket.shutdown().await {
            trace!("Shutdown of {} failed: {}", peer, e);
        }
        drop(socket);

        let reason = match &result {
            Ok(end) => end.reason().to_string(),
            Err(e) => e.to_string(),
        };
        let stats = *self.stats.borrow();
        info!(
            "Session with {} closed ({}): {} frames, {} bytes",
            peer, reason, stats.frames_sent, stats.bytes_sent
        );
        self.close(Some((peer, reason)));

        result.map(|_| ())
    }

    async fn stream(&mut self, socket: &mut TcpStream) -> Result<SessionEnd> {
        let (mut reader, mut writer) = socket.split();
        let channels = self.source.channel_count();
        let mut pacer = Pacer::new(self.source.tick_rate())?;
        let mut packet = Vec::with_capacity(packet_len(channels));
        let mut inbound = [0u8; 64];
        let mut wraps = self.source.wraps();

        self.state.send_replace(TransmitterState::Streaming);
        debug!("Pacing at {:?} per frame", pacer.period());

        loop {
            // A due tick outranks inbound bytes so a chatty peer cannot stall pacing
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Stopped),
                _ = pacer.tick() => {}
                read = reader.read(&mut inbound) => match read {
                    Ok(0) => return Ok(SessionEnd::PeerClosed),
                    Ok(n) => {
                        trace!("Ignoring {} inbound bytes", n);
                        continue;
                    }
                    Err(e) => return Err(StreamError::Read { source: e }),
                },
            }

            let frame = match self.source.next_frame() {
                Ok(frame) => frame,
                Err(e @ StreamError::Source { .. }) => {
                    warn!("Skipping replay row: {}", e);
                    self.stats.send_modify(|s| s.source_errors += 1);
                    self.events.emit(StreamEvent::SourceError { reason: e.to_string() });
                    continue;
                }
                Err(StreamError::EndOfReplay { rows }) => {
                    info!("Replay finished after {} rows", rows);
                    self.events.emit(StreamEvent::ReplayEnded { rows });
                    return Ok(SessionEnd::ReplayEnded);
                }
                Err(e) => return Err(e),
            };

            if self.source.wraps() != wraps {
                wraps = self.source.wraps();
                debug!("Replay wrapped ({} total)", wraps);
                self.events.emit(StreamEvent::ReplayWrapped { wraps });
            }

            packet.clear();
            encode_into(&frame, &mut packet);

            let write = tokio::time::timeout(self.write_timeout, writer.write_all(&packet));
            let written = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(SessionEnd::Stopped),
                written = write => written,
            };
            match written {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(StreamError::Write { source: e }),
                Err(_) => {
                    return Err(StreamError::Write {
                        source: std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            format!("peer stalled for {:?}", self.write_timeout),
                        ),
                    });
                }
            }

            trace!("Sent frame {} ({} bytes)", frame.sequence(), packet.len());
            let len = packet.len() as u64;
            self.stats.send_modify(|s| {
                s.frames_sent += 1;
                s.bytes_sent += len;
            });
        }
    }

    fn close(&self, peer: Option<(SocketAddr, String)>) {
        self.state.send_replace(TransmitterState::Closed);
        if let Some((peer, reason)) = peer {
            self.events.emit(StreamEvent::PeerDisconnected { peer, reason });
        }
        if self.cancel.is_cancelled() {
            self.events.emit(StreamEvent::Stopped);
        }
    }
}
