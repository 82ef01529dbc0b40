//! Rate limiting for the relay.
//!
//! Both limiters are keyed by [`PublicKey`]:
//! - connection attempts per presented key
//! - envelopes per sender key
//!
//! They use governor's keyed rate limiters backed by DashMap.

use crate::config::{ConfigError, LimitsConfig};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use relay_types::PublicKey;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits connection attempts per presented key.
    ///
    /// Configured via `limits.connections_per_key`.
    connection_limiter: Arc<KeyedLimiter<PublicKey>>,

    /// Limits envelopes per sender key.
    ///
    /// Configured via `limits.messages_per_minute`.
    message_limiter: Arc<KeyedLimiter<PublicKey>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<PublicKey>")
            .field("message_limiter", &"KeyedLimiter<PublicKey>")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLimit`] if a configured rate is zero.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let connections_per_minute = NonZeroU32::new(config.connections_per_key).ok_or(
            ConfigError::InvalidLimit {
                name: "limits.connections_per_key",
            },
        )?;
        let messages_per_minute = NonZeroU32::new(config.messages_per_minute).ok_or(
            ConfigError::InvalidLimit {
                name: "limits.messages_per_minute",
            },
        )?;

        Ok(Self {
            connection_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(
                connections_per_minute,
            ))),
            message_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(
                messages_per_minute,
            ))),
        })
    }

    /// Check if a connection attempt for this key is allowed.
    pub fn check_connection(&self, key: &PublicKey) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(key)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if another envelope from this sender is allowed.
    pub fn check_message(&self, sender: &PublicKey) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(sender)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Get the number of tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Get the number of tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Forget keys whose quota has fully recharged.
    ///
    /// Keeps limiter memory proportional to recently active keys. Called
    /// periodically by the maintenance task.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many connection attempts for this key.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
    /// Too many envelopes from this sender.
    #[error("message rate limit exceeded")]
    MessageLimitExceeded,
}
