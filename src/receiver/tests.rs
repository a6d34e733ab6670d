//! Receiver tests against an in-memory transport
//!
//! Each scripted entry is either a refusal or one end of a duplex pipe whose
//! other end plays the transmitter.

use super::*;
use crate::events::StreamEvent;
use crate::protocol::encode;
use crate::types::{SampleFrame, UpdateRate};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Default)]
struct Script {
    pending: Mutex<VecDeque<Option<DuplexStream>>>,
    attempts: AtomicU32,
}

#[derive(Clone, Default)]
struct ScriptedTransport {
    script: Arc<Script>,
}

impl ScriptedTransport {
    fn refuse_next(&self) {
        self.script.pending.lock().unwrap().push_back(None);
    }

    /// Queue a session and return the transmitter's end of it
    fn accept_next(&self) -> DuplexStream {
        let (ours, theirs) = duplex(64 * 1024);
        self.script.pending.lock().unwrap().push_back(Some(theirs));
        ours
    }

    fn attempts(&self) -> u32 {
        self.script.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Stream = DuplexStream;

    async fn connect(&self, endpoint: &Endpoint) -> Result<DuplexStream> {
        self.script.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.pending.lock().unwrap().pop_front().flatten();
        next.ok_or_else(|| {
            StreamError::connect_failed(endpoint.to_string(), std::io::ErrorKind::ConnectionRefused.into())
        })
    }
}

fn config(channels: usize) -> ReceiverConfig {
    ReceiverConfig { channel_count: channels, ..ReceiverConfig::default() }
}

fn frame(sequence: u32) -> SampleFrame {
    SampleFrame::new(sequence, vec![sequence as i32 * 10, -1]).unwrap()
}

async fn next_matching<F>(events: &mut broadcast::Receiver<StreamEvent>, mut predicate: F) -> StreamEvent
where
    F: FnMut(&StreamEvent) -> bool,
{
    loop {
        let event = events.recv().await.unwrap();
        if predicate(&event) {
            return event;
        }
    }
}

#[tokio::test]
async fn forwards_frames_from_session() {
    let transport = ScriptedTransport::default();
    let mut peer = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);

    receiver.connect(Endpoint::default()).unwrap();
    for seq in 0..3 {
        peer.write_all(&encode(&frame(seq))).await.unwrap();
    }

    for seq in 0..3 {
        assert_eq!(*frames.next().await.unwrap(), frame(seq));
    }
    assert_eq!(receiver.state(), ReceiverState::Connected);
    assert_eq!(receiver.parser_stats().frames, 3);

    receiver.disconnect().await;
    assert_eq!(receiver.state(), ReceiverState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn refused_connection_is_retried_after_backoff() {
    let transport = ScriptedTransport::default();
    transport.refuse_next();
    let _peer = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut events = receiver.events().subscribe();

    let start = Instant::now();
    receiver.connect(Endpoint::default()).unwrap();

    let endpoint = Endpoint::default().to_string();
    assert_eq!(
        events.recv().await.unwrap(),
        StreamEvent::Connecting { endpoint: endpoint.clone(), attempt: 1 }
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        StreamEvent::ConnectFailed { attempt: 1, .. }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        StreamEvent::ReconnectScheduled { attempt: 2, delay: Duration::from_secs(3) }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        StreamEvent::Connecting { endpoint: endpoint.clone(), attempt: 2 }
    );
    assert_eq!(events.recv().await.unwrap(), StreamEvent::Connected { endpoint });

    assert!(Instant::now() - start >= Duration::from_secs(3));
    assert_eq!(transport.attempts(), 2);
    assert_eq!(receiver.state(), ReceiverState::Connected);
}

#[tokio::test(start_paused = true)]
async fn lost_session_reconnects_without_residue() {
    let transport = ScriptedTransport::default();
    let mut first = transport.accept_next();
    let mut second = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);
    let mut events = receiver.events().subscribe();

    receiver.connect(Endpoint::default()).unwrap();

    // One whole packet, then half of the next, then the transmitter dies
    let partial = encode(&frame(1));
    first.write_all(&encode(&frame(0))).await.unwrap();
    first.write_all(&partial[..partial.len() / 2]).await.unwrap();
    drop(first);

    // The restarted transmitter begins its own sequence at zero
    for seq in 0..3 {
        second.write_all(&encode(&frame(seq))).await.unwrap();
    }

    assert_eq!(frames.next().await.unwrap().sequence(), 0);
    for seq in 0..3 {
        assert_eq!(*frames.next().await.unwrap(), frame(seq));
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, StreamEvent::Disconnected { .. })));
    assert_eq!(seen.iter().filter(|e| matches!(e, StreamEvent::Connected { .. })).count(), 2);
    assert!(!seen.iter().any(|e| matches!(e, StreamEvent::ParseError { .. })));

    let stats = receiver.parser_stats();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.rejected, 0);
    assert_eq!(transport.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_suppresses_reconnect() {
    let transport = ScriptedTransport::default();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut events = receiver.events().subscribe();

    receiver.connect(Endpoint::default()).unwrap();
    next_matching(&mut events, |e| matches!(e, StreamEvent::ReconnectScheduled { .. })).await;

    receiver.disconnect().await;
    assert_eq!(receiver.state(), ReceiverState::Disconnected);
    assert_eq!(
        next_matching(&mut events, |e| matches!(e, StreamEvent::Stopped)).await,
        StreamEvent::Stopped
    );

    let attempts = transport.attempts();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.attempts(), attempts);
}

#[tokio::test(start_paused = true)]
async fn keeps_retrying_while_transmitter_is_absent() {
    let transport = ScriptedTransport::default();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut events = receiver.events().subscribe();

    receiver.connect(Endpoint::default()).unwrap();
    for expected in 1..=20u32 {
        let event =
            next_matching(&mut events, |e| matches!(e, StreamEvent::ConnectFailed { .. })).await;
        assert!(matches!(event, StreamEvent::ConnectFailed { attempt, .. } if attempt == expected));
    }
    assert!(receiver.state().is_reconnecting());

    // Transmitter finally appears
    let mut peer = transport.accept_next();
    next_matching(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);
    peer.write_all(&encode(&frame(0))).await.unwrap();
    assert_eq!(frames.next().await.unwrap().sequence(), 0);
}

#[tokio::test]
async fn corrupt_packet_is_reported_and_skipped() {
    let transport = ScriptedTransport::default();
    let mut peer = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);
    let mut events = receiver.events().subscribe();
    receiver.connect(Endpoint::default()).unwrap();

    let mut corrupt = encode(&frame(0));
    corrupt[10] ^= 0x5A;
    peer.write_all(&corrupt).await.unwrap();
    peer.write_all(&encode(&frame(1))).await.unwrap();

    assert_eq!(frames.next().await.unwrap().sequence(), 1);
    assert!(matches!(
        next_matching(&mut events, |e| matches!(e, StreamEvent::ParseError { .. })).await,
        StreamEvent::ParseError { .. }
    ));
    assert!(receiver.parser_stats().rejected >= 1);
    assert_eq!(receiver.state(), ReceiverState::Connected);
}

#[tokio::test]
async fn connect_while_running_is_rejected() {
    let transport = ScriptedTransport::default();
    let _peer = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport).unwrap();

    receiver.connect(Endpoint::default()).unwrap();
    assert!(matches!(
        receiver.connect(Endpoint::default()),
        Err(StreamError::InvalidState { .. })
    ));
    assert!(matches!(
        Receiver::with_transport(&config(2), ScriptedTransport::default())
            .unwrap()
            .connect(Endpoint::new("  ", 1)),
        Err(StreamError::Config { .. })
    ));
}

#[tokio::test]
async fn reconnects_after_explicit_disconnect() {
    let transport = ScriptedTransport::default();
    let _first = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport.clone()).unwrap();
    let mut events = receiver.events().subscribe();

    receiver.connect(Endpoint::default()).unwrap();
    next_matching(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;
    receiver.disconnect().await;
    assert_eq!(receiver.state(), ReceiverState::Disconnected);

    let mut second = transport.accept_next();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);
    receiver.connect(Endpoint::default()).unwrap();
    second.write_all(&encode(&frame(42))).await.unwrap();
    assert_eq!(frames.next().await.unwrap().sequence(), 42);
    assert_eq!(receiver.state(), ReceiverState::Connected);
}

#[tokio::test]
async fn state_updates_follow_transitions() {
    let transport = ScriptedTransport::default();
    let _peer = transport.accept_next();
    let mut receiver = Receiver::with_transport(&config(2), transport).unwrap();
    let mut updates = receiver.state_updates().boxed();
    assert_eq!(updates.next().await, Some(ReceiverState::Disconnected));

    receiver.connect(Endpoint::default()).unwrap();
    loop {
        if updates.next().await == Some(ReceiverState::Connected) {
            break;
        }
    }
    receiver.disconnect().await;
    assert_eq!(updates.next().await, Some(ReceiverState::Disconnected));
}
