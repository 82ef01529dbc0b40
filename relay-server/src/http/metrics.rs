//! Prometheus metrics endpoint.

use crate::server::{RelayMetrics, RelayServer};
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(relay): Extension<Arc<RelayServer>>) -> impl IntoResponse {
    let body = render(&relay);
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

fn render(relay: &RelayServer) -> String {
    let m: &RelayMetrics = relay.metrics();

    // Gauges: current state
    let connections = relay.total_connections();
    let limiter_keys = relay.rate_limits().connection_keys_count()
        + relay.rate_limits().message_keys_count();

    // Counters: monotonic since startup
    let accepted = m.connections_accepted.load(Ordering::Relaxed);
    let sessions = m.sessions_started.load(Ordering::Relaxed);
    let handshake_failures = m.handshake_failures.load(Ordering::Relaxed);
    let routed = m.envelopes_routed.load(Ordering::Relaxed);
    let delivered = m.envelopes_delivered.load(Ordering::Relaxed);
    let undeliverable = m.undeliverable_total.load(Ordering::Relaxed);
    let backpressure = m.backpressure_drops.load(Ordering::Relaxed);
    let malformed = m.malformed_frames.load(Ordering::Relaxed);
    let evictions = m.evictions_total.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);

    format!(
        r#"# HELP nullref_relay_connections_active Number of registered connections
# TYPE nullref_relay_connections_active gauge
nullref_relay_connections_active {connections}

# HELP nullref_relay_rate_limiter_keys Keys tracked by the rate limiters
# TYPE nullref_relay_rate_limiter_keys gauge
nullref_relay_rate_limiter_keys {limiter_keys}

# HELP nullref_relay_info Server information
# TYPE nullref_relay_info gauge
nullref_relay_info{{version="{version}"}} 1

# HELP nullref_relay_connections_total Total TCP connections accepted
# TYPE nullref_relay_connections_total counter
nullref_relay_connections_total {accepted}

# HELP nullref_relay_sessions_total Total sessions registered
# TYPE nullref_relay_sessions_total counter
nullref_relay_sessions_total {sessions}

# HELP nullref_relay_handshake_failures_total Total connections rejected before registration
# TYPE nullref_relay_handshake_failures_total counter
nullref_relay_handshake_failures_total {handshake_failures}

# HELP nullref_relay_envelopes_routed_total Total envelopes placed on a delivery queue
# TYPE nullref_relay_envelopes_routed_total counter
nullref_relay_envelopes_routed_total {routed}

# HELP nullref_relay_envelopes_delivered_total Total envelopes written to a recipient
# TYPE nullref_relay_envelopes_delivered_total counter
nullref_relay_envelopes_delivered_total {delivered}

# HELP nullref_relay_undeliverable_total Total envelopes dropped for a missing or closing recipient
# TYPE nullref_relay_undeliverable_total counter
nullref_relay_undeliverable_total {undeliverable}

# HELP nullref_relay_backpressure_drops_total Total envelopes dropped on a full delivery queue
# TYPE nullref_relay_backpressure_drops_total counter
nullref_relay_backpressure_drops_total {backpressure}

# HELP nullref_relay_malformed_frames_total Total frames that failed to decode
# TYPE nullref_relay_malformed_frames_total counter
nullref_relay_malformed_frames_total {malformed}

# HELP nullref_relay_evictions_total Total connections replaced by a newer one with the same key
# TYPE nullref_relay_evictions_total counter
nullref_relay_evictions_total {evictions}

# HELP nullref_relay_rate_limit_hits_total Total rate limit rejections
# TYPE nullref_relay_rate_limit_hits_total counter
nullref_relay_rate_limit_hits_total {rate_limits}
"#,
        version = env!("CARGO_PKG_VERSION"),
    )
}
