//! Per-client connection state.
//!
//! A [`Connection`] is a cheap, cloneable handle held by the registry and by
//! routers. The consuming end of its delivery queue, [`DeliveryQueue`], is
//! owned by exactly one writer loop.

use crate::error::SendError;
use relay_types::{Envelope, PublicKey};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Connection lifecycle states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport open, not yet registered.
    Connecting = 0,
    /// Registered; accepts envelopes.
    Active = 1,
    /// Teardown requested.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

struct Inner {
    id: Uuid,
    public_key: PublicKey,
    queue: mpsc::Sender<Envelope>,
    state: AtomicU8,
    shutdown: watch::Sender<bool>,
}

/// Handle to one live client session.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

/// Consuming end of a connection's delivery queue.
pub struct DeliveryQueue {
    rx: mpsc::Receiver<Envelope>,
}

impl Connection {
    /// Create a connection in the `Connecting` state with a bounded queue.
    ///
    /// A zero capacity is raised to one.
    pub fn new(public_key: PublicKey, capacity: usize) -> (Self, DeliveryQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let connection = Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                public_key,
                queue: tx,
                state: AtomicU8::new(ConnectionState::Connecting as u8),
                shutdown,
            }),
        };
        (connection, DeliveryQueue { rx })
    }

    /// Unique id distinguishing this connection from others with the same key.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The public key presented at connect time.
    pub fn public_key(&self) -> &PublicKey {
        &self.inner.public_key
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Whether two handles refer to the same connection.
    pub fn same_as(&self, other: &Connection) -> bool {
        self.inner.id == other.inner.id
    }

    /// Move `Connecting` to `Active`. Returns false if already past `Connecting`.
    pub fn activate(&self) -> bool {
        self.inner
            .state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Enqueue an envelope for delivery to this client without waiting.
    ///
    /// # Errors
    ///
    /// [`SendError::Backpressure`] when the queue is full,
    /// [`SendError::Closed`] when the connection is not `Active`.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        if self.state() != ConnectionState::Active {
            return Err(SendError::Closed);
        }
        self.inner.queue.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Ask the connection's loops to stop.
    ///
    /// Returns true if this call started the teardown.
    pub fn close(&self) -> bool {
        let previous = self
            .inner
            .state
            .fetch_max(ConnectionState::Closing as u8, Ordering::AcqRel);
        self.inner.shutdown.send_replace(true);
        previous < ConnectionState::Closing as u8
    }

    /// Record that teardown finished.
    pub(crate) fn mark_closed(&self) {
        self.inner
            .state
            .fetch_max(ConnectionState::Closed as u8, Ordering::AcqRel);
        self.inner.shutdown.send_replace(true);
    }

    /// Whether teardown has been requested or finished.
    pub fn is_closing(&self) -> bool {
        self.state() >= ConnectionState::Closing
    }

    /// Resolve once [`close`](Self::close) has been called.
    pub async fn closed(&self) {
        let mut rx = self.inner.shutdown.subscribe();
        // The sender lives as long as `self`, so this only returns on close.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("public_key", &self.inner.public_key)
            .field("state", &self.state())
            .finish()
    }
}

impl DeliveryQueue {
    /// Wait for the next envelope. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Take the next envelope if one is queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Close the queue and drop everything still in it.
    ///
    /// Returns the number of discarded envelopes.
    pub fn discard(mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue").finish_non_exhaustive()
    }
}
