//! Per-connection session management.
//!
//! Each registered connection gets a Session that runs two loops:
//! - the reader decodes inbound frames and hands envelopes to the router
//! - the writer drains the delivery queue onto the transport
//!
//! Whichever loop stops first (peer close or `DISCONNECT`, transport error,
//! or a close request from eviction or shutdown) ends the session, and
//! teardown runs exactly once.

use crate::connection::{Connection, DeliveryQueue};
use crate::error::RouteError;
use crate::server::RelayServer;
use crate::transport::{FrameSink, FrameSource};
use relay_types::{labels, Envelope};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the transport.
    PeerClosed,
    /// The peer sent `DISCONNECT`.
    Disconnected,
    /// Reading from the transport failed.
    ReadFailed,
    /// Writing to the transport failed.
    WriteFailed,
    /// The connection was asked to close (eviction or shutdown).
    CloseRequested,
}

/// A per-connection session.
pub struct Session {
    relay: Arc<RelayServer>,
    connection: Connection,
    queue: DeliveryQueue,
    greeting: Option<Envelope>,
}

impl Session {
    /// Create a new session for a registered connection.
    pub fn new(relay: Arc<RelayServer>, connection: Connection, queue: DeliveryQueue) -> Self {
        Self {
            relay,
            connection,
            queue,
            greeting: None,
        }
    }

    /// Write this envelope before anything from the delivery queue.
    pub fn with_greeting(mut self, greeting: Envelope) -> Self {
        self.greeting = Some(greeting);
        self
    }

    /// Run the session until completion, then tear it down.
    pub async fn run<S, K>(self, mut source: S, mut sink: K) -> SessionEnd
    where
        S: FrameSource,
        K: FrameSink,
    {
        let Session {
            relay,
            connection,
            mut queue,
            greeting,
        } = self;

        let greeted = match &greeting {
            Some(greeting) => write_envelope(&connection, &mut sink, greeting).await,
            None => true,
        };

        let end = if greeted {
            tokio::select! {
                end = read_loop(&relay, &connection, &mut source) => end,
                end = write_loop(&relay, &connection, &mut queue, &mut sink) => end,
                _ = connection.closed() => SessionEnd::CloseRequested,
            }
        } else {
            SessionEnd::WriteFailed
        };

        teardown(&relay, &connection, queue, &mut sink, end).await;
        end
    }
}

async fn read_loop<S: FrameSource>(
    relay: &RelayServer,
    connection: &Connection,
    source: &mut S,
) -> SessionEnd {
    loop {
        match source.read_frame().await {
            Ok(Some(frame)) => {
                if let FrameAction::Disconnect = handle_frame(relay, connection, &frame) {
                    tracing::debug!("Connection {} sent DISCONNECT", connection.id());
                    return SessionEnd::Disconnected;
                }
            }
            Ok(None) => {
                tracing::debug!("Connection {} closed by peer", connection.id());
                return SessionEnd::PeerClosed;
            }
            Err(e) => {
                tracing::warn!("Read failed on connection {}: {}", connection.id(), e);
                return SessionEnd::ReadFailed;
            }
        }
    }
}

enum FrameAction {
    Continue,
    Disconnect,
}

/// Decode one inbound frame and route it.
///
/// Only `DISCONNECT` ends the session; anything else that cannot be routed
/// is dropped.
fn handle_frame(relay: &RelayServer, connection: &Connection, frame: &[u8]) -> FrameAction {
    let envelope = match Envelope::decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            relay.metrics().malformed_frames.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Dropping malformed frame from {}: {}",
                connection.public_key().fingerprint(),
                e
            );
            return FrameAction::Continue;
        }
    };

    if envelope.has_label(labels::DISCONNECT) {
        return FrameAction::Disconnect;
    }
    if envelope.has_label(labels::NEW_CONNECTION) {
        tracing::warn!(
            "Dropping repeated NEW_CONNECTION from {}",
            connection.public_key().fingerprint()
        );
        return FrameAction::Continue;
    }

    // Limit by the identity the connection presented, not the claimed FROM
    if let Err(e) = relay.rate_limits().check_message(connection.public_key()) {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "Dropping envelope from {}: {}",
            connection.public_key().fingerprint(),
            e
        );
        return FrameAction::Continue;
    }

    if let Err(e) = relay.router().route(envelope) {
        if relay.config().routing.notify_sender_on_failure {
            notify_sender(connection, &e);
        }
    }
    FrameAction::Continue
}

/// Tell the sender its envelope was dropped. Best effort.
fn notify_sender(connection: &Connection, error: &RouteError) {
    let own_key = connection.public_key();
    let about = match error {
        RouteError::Undeliverable { recipient }
        | RouteError::Backpressure { recipient }
        | RouteError::RecipientClosed { recipient } => recipient.clone(),
        RouteError::MissingRecipient | RouteError::MissingSender => own_key.clone(),
    };

    let feedback = Envelope::error(own_key.clone(), about, &error.to_string());
    if let Err(e) = connection.send(feedback) {
        tracing::debug!(
            "Could not notify {} of routing failure: {}",
            own_key.fingerprint(),
            e
        );
    }
}

async fn write_loop<K: FrameSink>(
    relay: &RelayServer,
    connection: &Connection,
    queue: &mut DeliveryQueue,
    sink: &mut K,
) -> SessionEnd {
    // The connection holds a sender, so the queue only ends on close
    while let Some(envelope) = queue.recv().await {
        if !write_envelope(connection, sink, &envelope).await {
            return SessionEnd::WriteFailed;
        }
        relay.metrics().envelopes_delivered.fetch_add(1, Ordering::Relaxed);
    }
    SessionEnd::CloseRequested
}

/// Encode and write one envelope. Returns false if the transport failed.
async fn write_envelope<K: FrameSink>(
    connection: &Connection,
    sink: &mut K,
    envelope: &Envelope,
) -> bool {
    let frame = match envelope.encode() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("Failed to encode envelope for {}: {}", connection.id(), e);
            return true;
        }
    };

    match sink.write_frame(frame).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Write failed on connection {}: {}", connection.id(), e);
            false
        }
    }
}

async fn teardown<K: FrameSink>(
    relay: &RelayServer,
    connection: &Connection,
    queue: DeliveryQueue,
    sink: &mut K,
    end: SessionEnd,
) {
    connection.close();
    let unregistered = relay.registry().unregister(connection);
    let discarded = queue.discard();

    if let Err(e) = sink.close().await {
        tracing::debug!("Error closing transport for {}: {}", connection.id(), e);
    }
    connection.mark_closed();

    tracing::info!(
        "Session closed: key={} connection={} reason={:?} unregistered={} discarded={} (total: {})",
        connection.public_key().fingerprint(),
        connection.id(),
        end,
        unregistered,
        discarded,
        relay.total_connections()
    );
}
