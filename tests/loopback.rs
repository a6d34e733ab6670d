//! End-to-end tests: generator and receiver talking over loopback TCP.

use eeglink::config::{Endpoint, GeneratorConfig, ReceiverConfig, SourceConfig};
use eeglink::receiver::BackoffPolicy;
use eeglink::sources::EndPolicy;
use eeglink::types::{ChannelParams, SampleFrame, UpdateRate, Waveform};
use eeglink::{
    EegLink, ForwardMessage, JsonLinesSink, SampleSource, StreamEvent, Synthesizer, Transmitter,
    WebSocketPusher,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio::time::timeout;

const DEADLINE: Duration = Duration::from_secs(10);

fn generator(channels: usize, rate: f64) -> GeneratorConfig {
    GeneratorConfig {
        endpoint: Endpoint::new("127.0.0.1", 0),
        channel_count: channels,
        sample_rate: rate,
        ..GeneratorConfig::default()
    }
}

fn receiver_for(port: u16, channels: usize) -> ReceiverConfig {
    ReceiverConfig {
        endpoint: Endpoint::new("127.0.0.1", port),
        channel_count: channels,
        backoff: BackoffPolicy::fixed(Duration::from_millis(100)),
        ..ReceiverConfig::default()
    }
}

fn channels() -> Vec<ChannelParams> {
    vec![
        ChannelParams::sine(10.0, 100.0),
        ChannelParams::sine(3.0, 40.0).with_phase(1.0),
        ChannelParams::sine(22.0, 15.0).with_waveform(Waveform::Composite),
    ]
}

async fn next_frame(frames: &mut BoxStream<'static, Arc<SampleFrame>>) -> Arc<SampleFrame> {
    match timeout(DEADLINE, frames.next()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => panic!("forwarder closed"),
        Err(_) => panic!("no frame within {:?}", DEADLINE),
    }
}

#[tokio::test]
async fn frames_arrive_in_order_and_intact() {
    let config = generator(3, 500.0);
    let source = Synthesizer::new(channels(), 500.0).unwrap();
    let mut expected = source.clone();
    let mut transmitter = EegLink::serve(&config, source).await.unwrap();

    let receiver = EegLink::receive(&receiver_for(transmitter.local_addr().port(), 3)).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);

    for _ in 0..100 {
        let frame = next_frame(&mut frames).await;
        assert_eq!(*frame, expected.next_frame().unwrap());
    }

    transmitter.stop().await;
    assert_eq!(receiver.parser_stats().rejected, 0);
}

#[tokio::test]
async fn receiver_reconnects_once_after_transmitter_restart() {
    let config = generator(2, 1000.0);
    let synth = || Synthesizer::uniform(2, ChannelParams::default(), 1000.0).unwrap();
    let mut first = EegLink::serve(&config, synth()).await.unwrap();
    let port = first.local_addr().port();

    let mut receiver = EegLink::receive(&receiver_for(port, 2)).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);
    let mut events = receiver.events().subscribe();

    let mut last = next_frame(&mut frames).await.sequence();
    while last < 20 {
        last = next_frame(&mut frames).await.sequence();
    }

    first.stop().await;
    let restarted = GeneratorConfig { endpoint: Endpoint::new("127.0.0.1", port), ..config };
    let mut second = EegLink::serve(&restarted, synth()).await.unwrap();

    // Skip the tail of the first session; the new one starts over at zero
    let mut frame = next_frame(&mut frames).await;
    while frame.sequence() != 0 {
        assert!(frame.sequence() > last, "sequence went backwards without a reset");
        last = frame.sequence();
        frame = next_frame(&mut frames).await;
    }
    for expected in 1..10 {
        assert_eq!(next_frame(&mut frames).await.sequence(), expected);
    }

    let mut connected = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            StreamEvent::Connected { .. } => connected += 1,
            StreamEvent::ParseError { reason } => panic!("residue leaked into new session: {}", reason),
            _ => {}
        }
    }
    assert_eq!(connected, 2);

    second.stop().await;
    receiver.disconnect().await;
}

#[tokio::test]
async fn replay_file_streams_each_row_once() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "time,ch1,ch2").unwrap();
    for row in 0..5 {
        writeln!(file, "{},{},{}", row as f64 * 0.004, row * 10, -(row * 10)).unwrap();
    }
    file.flush().unwrap();

    let config = GeneratorConfig {
        source: SourceConfig::Replay {
            path: file.path().to_path_buf(),
            end_policy: EndPolicy::Stop,
            speed: 1.0,
            format: eeglink::replay::TableFormat { has_header: true, timestamp_column: true },
        },
        ..generator(2, 500.0)
    };
    let mut transmitter = Transmitter::start(&config, config.build_source().unwrap()).await.unwrap();
    let mut transmitter_events = transmitter.events().stream().boxed();

    let receiver = EegLink::receive(&receiver_for(transmitter.local_addr().port(), 2)).unwrap();
    let mut frames = receiver.forwarder().subscribe(UpdateRate::Native);

    for row in 0..5u32 {
        let frame = next_frame(&mut frames).await;
        assert_eq!(frame.sequence(), row);
        let uv = frame.microvolts();
        assert!((uv[0] - row as f64 * 10.0).abs() < 1e-3);
        assert!((uv[1] + row as f64 * 10.0).abs() < 1e-3);
    }

    timeout(DEADLINE, transmitter.wait()).await.unwrap().unwrap();
    assert_eq!(transmitter.stats().frames_sent, 5);

    let mut ended = false;
    while let Ok(Some(event)) = timeout(Duration::from_millis(200), transmitter_events.next()).await {
        ended |= event == StreamEvent::ReplayEnded { rows: 5 };
    }
    assert!(ended);
}

#[tokio::test]
async fn json_lines_reach_downstream_consumers() {
    let config = generator(3, 500.0);
    let mut transmitter =
        EegLink::serve(&config, Synthesizer::new(channels(), 500.0).unwrap()).await.unwrap();

    let receiver = EegLink::receive(&receiver_for(transmitter.local_addr().port(), 3)).unwrap();
    let mut sink = JsonLinesSink::bind(
        &Endpoint::new("127.0.0.1", 0),
        receiver.forwarder().clone(),
        UpdateRate::Native,
    )
    .await
    .unwrap();

    let client = TcpStream::connect(sink.local_addr()).await.unwrap();
    let mut lines = BufReader::new(client).lines();

    let mut previous: Option<u32> = None;
    for _ in 0..20 {
        let line = timeout(DEADLINE, lines.next_line()).await.unwrap().unwrap().unwrap();
        let message = ForwardMessage::from_json(&line).unwrap();
        assert_eq!(message.channels.len(), 3);
        if let Some(previous) = previous {
            assert_eq!(message.sequence, previous + 1);
        }
        previous = Some(message.sequence);
    }

    sink.shutdown().await;
    transmitter.stop().await;
}

#[tokio::test]
async fn websocket_server_receives_every_frame() {
    let config = generator(3, 500.0);
    let mut transmitter =
        EegLink::serve(&config, Synthesizer::new(channels(), 500.0).unwrap()).await.unwrap();
    let mut receiver = EegLink::receive(&receiver_for(transmitter.local_addr().port(), 3)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut pusher = WebSocketPusher::start(
        format!("ws://{}", listener.local_addr().unwrap()),
        receiver.forwarder().clone(),
        UpdateRate::Native,
        BackoffPolicy::fixed(Duration::from_millis(100)),
    )
    .unwrap();

    let (stream, _) = timeout(DEADLINE, listener.accept()).await.unwrap().unwrap();
    let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

    let mut previous: Option<u32> = None;
    for _ in 0..20 {
        let message = match timeout(DEADLINE, server.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => ForwardMessage::from_json(text.as_str()).unwrap(),
            other => panic!("expected a text message, got {:?}", other),
        };
        assert_eq!(message.channels.len(), 3);
        if let Some(previous) = previous {
            assert_eq!(message.sequence, previous + 1);
        }
        previous = Some(message.sequence);
    }

    pusher.shutdown().await;
    receiver.disconnect().await;
    transmitter.stop().await;
}
