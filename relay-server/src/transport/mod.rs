//! Transport abstraction for the relay.
//!
//! A connection's transport is split into two halves so the reader and
//! writer loops can each own one:
//! - [`FrameSource`] yields one frame at a time, `None` once the peer has closed
//! - [`FrameSink`] writes one frame at a time and closes the transport
//!
//! Implementations: [`websocket`] (tokio-tungstenite) and, in unit tests,
//! an in-memory mock.

#[cfg(test)]
pub(crate) mod mock;
pub mod websocket;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors. Any of these is fatal to the connection that hit it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Peer sent a frame larger than the configured maximum.
    #[error("frame exceeds maximum size")]
    FrameTooLarge,
}

/// Read half of a connection's transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Write half of a connection's transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame.
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}
