//! Error types for the envelope codec.

use thiserror::Error;

/// Errors produced while encoding or decoding envelopes.
///
/// Every decoding failure is a malformed frame: the relay logs it and keeps
/// reading from the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not valid base64
    #[error("malformed frame: invalid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),

    /// Frame decoded but is not a valid envelope object
    #[error("malformed frame: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl CodecError {
    /// Whether this error came from undecodable or schema-invalid input.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Self::InvalidBase64(_) | Self::InvalidEnvelope(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::InvalidBase64(base64::DecodeError::InvalidLength(3));
        assert!(err.to_string().starts_with("malformed frame: invalid base64"));
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CodecError>();
    }
}
