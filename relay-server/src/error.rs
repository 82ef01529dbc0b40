//! Error types for the relay.

use crate::transport::TransportError;
use relay_types::{CodecError, PublicKey};

/// Main error type for relay operations that surface to the process.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O error (bind, accept).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an envelope could not be placed on a recipient's delivery queue.
///
/// All variants are recovered locally: the envelope is dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Envelope has an empty `TO`.
    #[error("envelope has no recipient")]
    MissingRecipient,

    /// Envelope has an empty `FROM`.
    #[error("envelope has no sender")]
    MissingSender,

    /// No live connection is registered for the recipient.
    #[error("recipient {} is not connected", .recipient.fingerprint())]
    Undeliverable {
        /// The unresolved recipient.
        recipient: PublicKey,
    },

    /// Recipient's delivery queue is full.
    #[error("recipient {} delivery queue is full", .recipient.fingerprint())]
    Backpressure {
        /// The slow recipient.
        recipient: PublicKey,
    },

    /// Recipient was found but is shutting down.
    #[error("recipient {} is closing", .recipient.fingerprint())]
    RecipientClosed {
        /// The closing recipient.
        recipient: PublicKey,
    },
}

/// Failure to enqueue on a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Delivery queue is at capacity.
    #[error("delivery queue is full")]
    Backpressure,

    /// Connection is not active.
    #[error("connection is closed")]
    Closed,
}

/// Failures while establishing a connection's identity.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// No NEW_CONNECTION frame within the configured timeout.
    #[error("handshake timed out after {0}s")]
    Timeout(u64),

    /// Transport closed before the handshake completed.
    #[error("connection closed before handshake")]
    Closed,

    /// Transport failure during the handshake.
    #[error("transport error during handshake: {0}")]
    Transport(#[from] TransportError),

    /// First frame could not be decoded.
    #[error("invalid handshake frame: {0}")]
    Malformed(#[from] CodecError),

    /// First frame was not NEW_CONNECTION.
    #[error("expected NEW_CONNECTION, got {0:?}")]
    UnexpectedLabel(String),

    /// NEW_CONNECTION carried an empty `FROM`.
    #[error("NEW_CONNECTION has no public key")]
    MissingKey,

    /// Too many connection attempts for this key.
    #[error("connection rate limit exceeded for {}", .0.fingerprint())]
    RateLimited(PublicKey),
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for routing.
pub type RouteResult = std::result::Result<(), RouteError>;
