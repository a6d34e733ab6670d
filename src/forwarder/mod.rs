//! Frame fan-out to independent consumers
//!
//! The receiver's read loop calls [`Forwarder::publish`] for every parsed
//! frame. Publishing never blocks: each subscriber has a bounded queue and a
//! subscriber that falls behind loses its oldest frames. Lost frames are counted
//! in [`ForwarderStats::dropped`].
//!
//! ```rust
//! use eeglink::forwarder::Forwarder;
//! use eeglink::types::{SampleFrame, UpdateRate};
//! use futures::StreamExt;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let forwarder = Forwarder::new(64, 250.0);
//! let mut frames = forwarder.subscribe(UpdateRate::Native);
//!
//! forwarder.publish(SampleFrame::new(0, vec![1, 2, 3]).unwrap());
//! assert_eq!(frames.next().await.unwrap().sequence(), 0);
//! # }
//! ```

mod message;
mod sink;
mod websocket;

pub use message::ForwardMessage;
pub use sink::JsonLinesSink;
pub use websocket::{DEFAULT_WEBSOCKET_URL, PusherStats, WebSocketPusher};
pub(crate) use websocket::validate_url as validate_websocket_url;

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, trace};

use crate::stream::ThrottleExt;
use crate::types::{SampleFrame, UpdateRate};

/// Snapshot of forwarder counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Frames handed to `publish`
    pub published: u64,
    /// Frames lost by lagging subscribers, summed over subscribers
    pub dropped: u64,
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Best-effort broadcast hub for parsed frames.
#[derive(Debug, Clone)]
pub struct Forwarder {
    tx: broadcast::Sender<Arc<SampleFrame>>,
    counters: Arc<Counters>,
    sample_rate: f64,
}

impl Forwarder {
    /// Hub retaining up to `capacity` frames per subscriber, for a stream
    /// arriving at `sample_rate` Hz.
    pub fn new(capacity: usize, sample_rate: f64) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, counters: Arc::new(Counters::default()), sample_rate }
    }

    /// Hand a frame to every current subscriber.
    pub fn publish(&self, frame: SampleFrame) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        trace!("Forwarding frame {}", frame.sequence());
        // No subscribers is not an error
        let _ = self.tx.send(Arc::new(frame));
    }

    /// Subscribe at the given rate.
    ///
    /// `UpdateRate::Native` yields every frame; `UpdateRate::Max(hz)` yields the
    /// latest frame at most `hz` times per second.
    pub fn subscribe(&self, rate: UpdateRate) -> BoxStream<'static, Arc<SampleFrame>> {
        let counters = Arc::clone(&self.counters);
        let frames = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let counters = Arc::clone(&counters);
            async move {
                match item {
                    Ok(frame) => Some(frame),
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        debug!("Subscriber lagged, {} frames dropped", missed);
                        counters.dropped.fetch_add(missed, Ordering::Relaxed);
                        None
                    }
                }
            }
        });

        match rate.throttle_interval(self.sample_rate) {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }

    /// Subscribe to frames already converted to their JSON message shape.
    pub fn messages(&self, rate: UpdateRate) -> BoxStream<'static, ForwardMessage> {
        self.subscribe(rate).map(|frame| ForwardMessage::from(frame.as_ref())).boxed()
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            published: self.counters.published.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            subscribers: self.tx.receiver_count(),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(sequence: u32) -> SampleFrame {
        SampleFrame::new(sequence, vec![sequence as i32, -(sequence as i32)]).unwrap()
    }

    #[tokio::test]
    async fn every_subscriber_gets_every_frame() {
        let forwarder = Forwarder::new(16, 250.0);
        let mut a = forwarder.subscribe(UpdateRate::Native);
        let mut b = forwarder.subscribe(UpdateRate::Native);

        for seq in 0..5 {
            forwarder.publish(frame(seq));
        }

        for seq in 0..5 {
            assert_eq!(a.next().await.unwrap().sequence(), seq);
            assert_eq!(b.next().await.unwrap().sequence(), seq);
        }
        assert_eq!(forwarder.stats().published, 5);
        assert_eq!(forwarder.stats().subscribers, 2);
    }

    #[test]
    fn publish_without_subscribers_never_blocks() {
        let forwarder = Forwarder::new(1, 250.0);
        for seq in 0..1000 {
            forwarder.publish(frame(seq));
        }
        let stats = forwarder.stats();
        assert_eq!(stats.published, 1000);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_loses_oldest_and_is_counted() {
        let forwarder = Forwarder::new(4, 250.0);
        let mut slow = forwarder.subscribe(UpdateRate::Native);

        for seq in 0..10 {
            forwarder.publish(frame(seq));
        }

        // Oldest six are gone; the newest four remain in order
        for seq in 6..10 {
            assert_eq!(slow.next().await.unwrap().sequence(), seq);
        }
        assert_eq!(forwarder.stats().dropped, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_subscription_yields_latest() {
        let forwarder = Forwarder::new(64, 250.0);
        let mut display = forwarder.subscribe(UpdateRate::Max(10));

        // First interval tick is immediate
        forwarder.publish(frame(0));
        assert_eq!(display.next().await.unwrap().sequence(), 0);

        for seq in 1..=5 {
            forwarder.publish(frame(seq));
        }
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(display.next().await.unwrap().sequence(), 5);
    }

    #[tokio::test]
    async fn messages_carry_microvolts() {
        let forwarder = Forwarder::new(4, 250.0);
        let mut messages = forwarder.messages(UpdateRate::Native);
        forwarder.publish(SampleFrame::from_microvolts(7, &[100.0, -50.0]).unwrap());

        let message = messages.next().await.unwrap();
        assert_eq!(message.sequence, 7);
        assert!((message.channels[0] - 100.0).abs() < 1e-3);
        assert!((message.channels[1] + 50.0).abs() < 1e-3);
    }
}
