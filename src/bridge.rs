//! Delivery bridge: crossing from the producer thread to the consumer.
//!
//! Backends call a [`DeliverySink`] directly from their real-time producer
//! context. The buffer passed to `on_data` is only valid for the duration
//! of the call, so an implementor must copy before returning, must return
//! promptly, and must preserve arrival order on its way to the consumer.
//!
//! Two implementors ship with the crate:
//! - [`CallbackSink`] wraps a pair of closures (useful for tests and thin
//!   shims that do their own queueing).
//! - [`ChannelBridge`] copies each buffer and enqueues it on an unbounded
//!   tokio channel for a cooperative async consumer.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::CaptureError;

/// Receiver for PCM frames and session errors.
///
/// Both methods are invoked from the producer thread. `on_data` borrows
/// the buffer only for the call; `on_error` fires at most once per session
/// for fatal conditions. After [`AudioEngine::stop`] returns, neither
/// method is invoked again.
///
/// [`AudioEngine::stop`]: crate::AudioEngine::stop
pub trait DeliverySink: Send + Sync {
    /// Called with one buffer of interleaved 16-bit little-endian PCM.
    ///
    /// The length is always a positive multiple of `channels × 2` bytes.
    fn on_data(&self, pcm: &[u8]);

    /// Called when the session fails.
    fn on_error(&self, error: &CaptureError);
}

/// A [`DeliverySink`] built from two closures.
pub struct CallbackSink {
    data: Box<dyn Fn(&[u8]) + Send + Sync>,
    error: Box<dyn Fn(&CaptureError) + Send + Sync>,
}

impl CallbackSink {
    /// Wraps a data and an error closure into a sink.
    pub fn new<D, E>(data: D, error: E) -> Self
    where
        D: Fn(&[u8]) + Send + Sync + 'static,
        E: Fn(&CaptureError) + Send + Sync + 'static,
    {
        Self {
            data: Box::new(data),
            error: Box::new(error),
        }
    }
}

impl DeliverySink for CallbackSink {
    fn on_data(&self, pcm: &[u8]) {
        (self.data)(pcm);
    }

    fn on_error(&self, error: &CaptureError) {
        (self.error)(error);
    }
}

/// Creates a shared [`DeliverySink`] from two closures.
///
/// # Example
///
/// ```
/// use pcm_capture::delivery_callbacks;
///
/// let sink = delivery_callbacks(
///     |pcm| println!("got {} bytes", pcm.len()),
///     |err| eprintln!("capture failed: {err}"),
/// );
/// # let _ = sink;
/// ```
pub fn delivery_callbacks<D, E>(data: D, error: E) -> Arc<dyn DeliverySink>
where
    D: Fn(&[u8]) + Send + Sync + 'static,
    E: Fn(&CaptureError) + Send + Sync + 'static,
{
    Arc::new(CallbackSink::new(data, error))
}

/// One item crossing the bridge, in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A copied PCM buffer.
    Data(Vec<u8>),
    /// The session's fatal error.
    Error(CaptureError),
}

/// Bridges the producer thread into an async consumer.
///
/// Each `on_data` call copies the borrowed buffer and enqueues it; the
/// channel is unbounded so the producer never blocks on a slow consumer.
/// Ordering is the channel's FIFO ordering, which matches capture order
/// because a session has exactly one producer.
///
/// # Example
///
/// ```
/// use pcm_capture::{ChannelBridge, Delivery};
///
/// let (bridge, rx) = ChannelBridge::new();
/// // Hand `bridge` to AudioEngine::start, then on the consumer side:
/// // while let Some(Delivery::Data(pcm)) = rx.recv().await { ... }
/// # drop(rx);
/// ```
pub struct ChannelBridge {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelBridge {
    /// Creates a bridge and the receiving end for the consumer.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DeliverySink for ChannelBridge {
    fn on_data(&self, pcm: &[u8]) {
        // A closed receiver just means the consumer went away; the engine
        // keeps capturing until stop() is called.
        let _ = self.tx.send(Delivery::Data(pcm.to_vec()));
    }

    fn on_error(&self, error: &CaptureError) {
        let _ = self.tx.send(Delivery::Error(error.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callback_sink_routes_both_paths() {
        let data_bytes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let data_clone = Arc::clone(&data_bytes);
        let errors_clone = Arc::clone(&errors);
        let sink = CallbackSink::new(
            move |pcm| {
                data_clone.fetch_add(pcm.len(), Ordering::SeqCst);
            },
            move |_| {
                errors_clone.fetch_add(1, Ordering::SeqCst);
            },
        );

        sink.on_data(&[0u8; 64]);
        sink.on_data(&[0u8; 32]);
        sink.on_error(&CaptureError::AlreadyRecording);

        assert_eq!(data_bytes.load(Ordering::SeqCst), 96);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_bridge_copies_and_preserves_order() {
        let (bridge, mut rx) = ChannelBridge::new();

        // Deliver from a borrowed buffer that is reused between calls,
        // as a producer thread would.
        let mut scratch = [0u8; 4];
        for i in 0..4u8 {
            scratch.fill(i);
            bridge.on_data(&scratch);
        }

        for i in 0..4u8 {
            match rx.recv().await.unwrap() {
                Delivery::Data(pcm) => assert_eq!(pcm, vec![i; 4]),
                Delivery::Error(err) => panic!("unexpected error: {err}"),
            }
        }
    }

    #[tokio::test]
    async fn test_channel_bridge_forwards_errors_in_order() {
        let (bridge, mut rx) = ChannelBridge::new();

        bridge.on_data(&[1, 2]);
        bridge.on_error(&CaptureError::disconnected("GetBuffer"));

        assert_eq!(rx.recv().await.unwrap(), Delivery::Data(vec![1, 2]));
        assert_eq!(
            rx.recv().await.unwrap(),
            Delivery::Error(CaptureError::disconnected("GetBuffer"))
        );
    }

    #[test]
    fn test_channel_bridge_survives_dropped_receiver() {
        let (bridge, rx) = ChannelBridge::new();
        drop(rx);

        // Must not panic or block.
        bridge.on_data(&[0u8; 16]);
        bridge.on_error(&CaptureError::AlreadyRecording);
    }
}
