//! Connection handshake and websocket accept path.
//!
//! A new transport must identify itself before it is registered: the first
//! frame is a `NEW_CONNECTION` envelope whose `FROM` is the client's public
//! key. The relay answers with an `ACK` and starts the session.

use crate::connection::Connection;
use crate::error::HandshakeError;
use crate::server::RelayServer;
use crate::session::SessionEnd;
use crate::transport::{websocket, FrameSink, FrameSource};
use relay_types::{labels, Envelope, PublicKey};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Wait for `NEW_CONNECTION` and return the presented public key.
///
/// # Errors
///
/// Fails on timeout, transport close or error, an undecodable frame, a
/// wrong label, an empty key, or when the key's connection rate is exceeded.
pub async fn handshake<S: FrameSource>(
    relay: &RelayServer,
    source: &mut S,
) -> Result<PublicKey, HandshakeError> {
    let timeout_secs = relay.config().limits.hello_timeout_secs;
    let frame = match tokio::time::timeout(Duration::from_secs(timeout_secs), source.read_frame())
        .await
    {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => return Err(HandshakeError::Closed),
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(HandshakeError::Timeout(timeout_secs)),
    };

    let hello = Envelope::decode(&frame)?;
    if !hello.has_label(labels::NEW_CONNECTION) {
        return Err(HandshakeError::UnexpectedLabel(hello.label));
    }
    if hello.from.is_empty() {
        return Err(HandshakeError::MissingKey);
    }

    if let Err(e) = relay.rate_limits().check_connection(&hello.from) {
        relay.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            "Connection rate limited for {}: {}",
            hello.from.fingerprint(),
            e
        );
        return Err(HandshakeError::RateLimited(hello.from));
    }

    Ok(hello.from)
}

/// Run the handshake on a fresh transport and start its session.
///
/// On failure the transport is closed and nothing is registered.
pub async fn establish<S, K>(
    relay: &Arc<RelayServer>,
    mut source: S,
    mut sink: K,
) -> Result<(Connection, JoinHandle<SessionEnd>), HandshakeError>
where
    S: FrameSource + 'static,
    K: FrameSink + 'static,
{
    match handshake(relay, &mut source).await {
        Ok(public_key) => Ok(relay.attach_greeted(public_key, source, sink)),
        Err(e) => {
            relay.metrics().handshake_failures.fetch_add(1, Ordering::Relaxed);
            if let Err(close_err) = sink.close().await {
                tracing::debug!("Error closing rejected transport: {}", close_err);
            }
            Err(e)
        }
    }
}

/// Upgrade an accepted TCP stream to a websocket and establish a session.
pub async fn accept_websocket(relay: Arc<RelayServer>, stream: TcpStream, peer: SocketAddr) {
    let limits = &relay.config().limits;
    let upgrade = tokio_tungstenite::accept_async_with_config(
        stream,
        Some(websocket::ws_config(limits.max_frame_size)),
    );

    let ws = match tokio::time::timeout(Duration::from_secs(limits.hello_timeout_secs), upgrade)
        .await
    {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            relay.metrics().handshake_failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Websocket upgrade failed for {}: {}", peer, e);
            return;
        }
        Err(_) => {
            relay.metrics().handshake_failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Websocket upgrade timed out for {}", peer);
            return;
        }
    };

    let (source, sink) = websocket::split(ws);
    if let Err(e) = establish(&relay, source, sink).await {
        tracing::warn!("Handshake failed for {}: {}", peer, e);
    }
}
