//! Mock transport for testing.
//!
//! [`mock_transport`] returns the relay-side halves plus a [`MockPeer`] that
//! plays the client: it queues inbound frames, captures written frames, and
//! can force failures.

use super::{FrameSink, FrameSource, TransportError};
use async_trait::async_trait;
use relay_types::Envelope;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

type Inbound = Result<Vec<u8>, TransportError>;

#[derive(Debug, Default)]
struct MockState {
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_writes: AtomicBool,
    closed_notify: Notify,
}

/// Relay-side read half of a mock transport.
#[derive(Debug)]
pub struct MockSource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Relay-side write half of a mock transport.
#[derive(Debug)]
pub struct MockSink {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    state: Arc<MockState>,
}

/// Client side of a mock transport.
#[derive(Debug)]
pub struct MockPeer {
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    state: Arc<MockState>,
}

/// Create a connected mock transport.
pub fn mock_transport() -> (MockSource, MockSink, MockPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let state = Arc::new(MockState::default());

    (
        MockSource { inbound: in_rx },
        MockSink {
            outbound: out_tx,
            state: Arc::clone(&state),
        },
        MockPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            state,
        },
    )
}

impl MockPeer {
    /// Queue a raw frame for the relay to read.
    pub fn send_frame(&self, frame: impl Into<Vec<u8>>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame.into()));
        }
    }

    /// Encode and queue an envelope for the relay to read.
    pub fn send_envelope(&self, envelope: &Envelope) {
        match envelope.encode() {
            Ok(frame) => self.send_frame(frame),
            Err(e) => tracing::error!("Mock peer failed to encode envelope: {}", e),
        }
    }

    /// Cause the relay's next read to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(TransportError::ReceiveFailed(error.to_string())));
        }
    }

    /// Cause every relay write to fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Close the client side; the relay reads end-of-stream once queued frames are drained.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait for the next frame written by the relay.
    ///
    /// Returns `None` once the relay has dropped its write half.
    pub async fn recv_frame(&mut self) -> Option<Vec<u8>> {
        self.outbound.recv().await
    }

    /// Wait for and decode the next envelope written by the relay.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        let frame = self.recv_frame().await?;
        Envelope::decode(&frame).ok()
    }

    /// Take a written frame if one is already available.
    pub fn try_recv_frame(&mut self) -> Option<Vec<u8>> {
        self.outbound.try_recv().ok()
    }

    /// Whether the relay has closed this transport.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// How many times the relay called `close`.
    pub fn close_count(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Wait until the relay closes this transport.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.state.closed_notify.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("injected write failure".to_string()));
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.closed_notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::PublicKey;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut source, mut sink, mut peer) = mock_transport();

        peer.send_frame(b"inbound".to_vec());
        assert_eq!(source.read_frame().await.unwrap(), Some(b"inbound".to_vec()));

        sink.write_frame(b"outbound".to_vec()).await.unwrap();
        assert_eq!(peer.recv_frame().await, Some(b"outbound".to_vec()));
    }

    #[tokio::test]
    async fn envelopes_are_encoded() {
        let (mut source, _sink, peer) = mock_transport();
        let envelope = Envelope::message(
            PublicKey::from_bytes(b"kb".to_vec()),
            PublicKey::from_bytes(b"ka".to_vec()),
            b"hello".to_vec(),
        );

        peer.send_envelope(&envelope);

        let frame = source.read_frame().await.unwrap().unwrap();
        assert_eq!(Envelope::decode(&frame).unwrap(), envelope);
    }

    #[tokio::test]
    async fn hang_up_reads_as_clean_close() {
        let (mut source, _sink, mut peer) = mock_transport();
        peer.send_frame(b"last".to_vec());
        peer.hang_up();

        assert_eq!(source.read_frame().await.unwrap(), Some(b"last".to_vec()));
        assert_eq!(source.read_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn forced_recv_failure() {
        let (mut source, _sink, peer) = mock_transport();
        peer.fail_next_recv("reset by peer");

        let result = source.read_frame().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));
    }

    #[tokio::test]
    async fn forced_write_failure() {
        let (_source, mut sink, peer) = mock_transport();
        peer.fail_writes(true);
        assert!(matches!(
            sink.write_frame(b"x".to_vec()).await,
            Err(TransportError::SendFailed(_))
        ));

        peer.fail_writes(false);
        sink.write_frame(b"x".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn close_is_observable() {
        let (_source, mut sink, peer) = mock_transport();
        assert!(!peer.is_closed());

        sink.close().await.unwrap();
        peer.wait_closed().await;

        assert!(peer.is_closed());
        assert_eq!(peer.close_count(), 1);
        assert!(matches!(
            sink.write_frame(b"late".to_vec()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
