//! Routing of envelopes to recipients' delivery queues.
//!
//! The router never waits on a recipient. An envelope either lands on the
//! recipient's queue immediately or is dropped: there is no store-and-forward
//! for offline keys and no blocking on full queues.

use crate::error::{RouteError, RouteResult, SendError};
use crate::registry::Registry;
use crate::server::RelayMetrics;
use relay_types::Envelope;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Resolves `TO` against the registry and enqueues on the target connection.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    metrics: Arc<RelayMetrics>,
}

impl Router {
    /// Create a router over a registry.
    pub fn new(registry: Arc<Registry>, metrics: Arc<RelayMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Route one envelope.
    ///
    /// Failures are logged and counted here; the returned error lets the
    /// caller decide whether to tell the sender.
    pub fn route(&self, envelope: Envelope) -> RouteResult {
        let result = self.try_route(envelope);
        match &result {
            Ok(()) => {
                self.metrics.envelopes_routed.fetch_add(1, Ordering::Relaxed);
            }
            Err(RouteError::Backpressure { recipient }) => {
                self.metrics.backpressure_drops.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Backpressure: dropped envelope for {} (queue full)",
                    recipient.fingerprint()
                );
            }
            Err(e) => {
                self.metrics.undeliverable_total.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropped undeliverable envelope: {}", e);
            }
        }
        result
    }

    fn try_route(&self, envelope: Envelope) -> RouteResult {
        if envelope.to.is_empty() {
            return Err(RouteError::MissingRecipient);
        }
        if envelope.from.is_empty() {
            return Err(RouteError::MissingSender);
        }

        let Some(target) = self.registry.lookup(&envelope.to) else {
            return Err(RouteError::Undeliverable {
                recipient: envelope.to,
            });
        };

        tracing::trace!(
            "Routing {} byte envelope {} -> {}",
            envelope.content.len(),
            envelope.from.fingerprint(),
            envelope.to.fingerprint()
        );

        target.send(envelope).map_err(|e| {
            let recipient = target.public_key().clone();
            match e {
                SendError::Backpressure => RouteError::Backpressure { recipient },
                SendError::Closed => RouteError::RecipientClosed { recipient },
            }
        })
    }
}
