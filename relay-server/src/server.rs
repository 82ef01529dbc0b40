//! Main relay server coordination.
//!
//! `RelayServer` owns the registry, router, rate limiters and metrics, runs
//! the accept loop, and starts one session per connection.

use crate::config::{Config, ConfigError};
use crate::connection::Connection;
use crate::error::Result;
use crate::limits::RateLimits;
use crate::protocol;
use crate::registry::Registry;
use crate::router::Router;
use crate::session::{Session, SessionEnd};
use crate::transport::{FrameSink, FrameSource};
use relay_types::{Envelope, PublicKey};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
/// Plain `AtomicU64`s, incremented without locks.
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total TCP connections accepted (before the websocket handshake).
    pub connections_accepted: AtomicU64,
    /// Total sessions started (connections registered under a key).
    pub sessions_started: AtomicU64,
    /// Total connections dropped during the handshake.
    pub handshake_failures: AtomicU64,
    /// Total envelopes placed on a recipient's delivery queue.
    pub envelopes_routed: AtomicU64,
    /// Total envelopes written to a recipient's transport.
    pub envelopes_delivered: AtomicU64,
    /// Total envelopes dropped because the recipient was missing or closing.
    pub undeliverable_total: AtomicU64,
    /// Total envelopes dropped because the recipient's queue was full.
    pub backpressure_drops: AtomicU64,
    /// Total frames that failed to decode.
    pub malformed_frames: AtomicU64,
    /// Total connections evicted by a newer connection with the same key.
    pub evictions_total: AtomicU64,
    /// Total rate limit rejections (connection + message).
    pub rate_limit_hits: AtomicU64,
}

/// Main relay server.
pub struct RelayServer {
    config: Config,
    registry: Arc<Registry>,
    router: Router,
    /// Rate limiters for connections and messages.
    rate_limits: RateLimits,
    /// Operational metrics (counters).
    metrics: Arc<RelayMetrics>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl RelayServer {
    /// Create a relay with an empty registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured limits are invalid.
    pub fn new(config: Config) -> std::result::Result<Self, ConfigError> {
        let rate_limits = RateLimits::new(&config.limits)?;
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(RelayMetrics::default());
        let router = Router::new(Arc::clone(&registry), Arc::clone(&metrics));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            router,
            rate_limits,
            metrics,
            shutdown,
        })
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get the router.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Number of currently registered connections.
    pub fn total_connections(&self) -> usize {
        self.registry.len()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Register a connection for an already identified transport and start
    /// its session.
    ///
    /// Any existing connection for the same key is evicted. Returns the new
    /// connection's handle and the session task.
    pub fn attach<S, K>(
        self: &Arc<Self>,
        public_key: PublicKey,
        source: S,
        sink: K,
    ) -> (Connection, JoinHandle<SessionEnd>)
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        self.start_session(public_key, source, sink, None)
    }

    /// Like [`attach`](Self::attach), but the session writes an `ACK` to
    /// the client before any routed envelope.
    pub fn attach_greeted<S, K>(
        self: &Arc<Self>,
        public_key: PublicKey,
        source: S,
        sink: K,
    ) -> (Connection, JoinHandle<SessionEnd>)
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let ack = Envelope::ack(public_key.clone());
        self.start_session(public_key, source, sink, Some(ack))
    }

    fn start_session<S, K>(
        self: &Arc<Self>,
        public_key: PublicKey,
        source: S,
        sink: K,
        greeting: Option<Envelope>,
    ) -> (Connection, JoinHandle<SessionEnd>)
    where
        S: FrameSource + 'static,
        K: FrameSink + 'static,
    {
        let (connection, queue) =
            Connection::new(public_key, self.config.limits.delivery_queue_capacity);
        connection.activate();

        if self.registry.register(connection.clone()).is_some() {
            self.metrics.evictions_total.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.sessions_started.fetch_add(1, Ordering::Relaxed);

        // shutdown() sets the flag before close_all(), so a registration that
        // close_all() missed always sees it here
        if self.is_shutting_down() {
            tracing::info!(
                "Relay shutting down, closing late connection {}",
                connection.id()
            );
            connection.close();
        }

        tracing::info!(
            "Session established: key={} connection={} (total: {})",
            connection.public_key().fingerprint(),
            connection.id(),
            self.registry.len()
        );

        let mut session = Session::new(Arc::clone(self), connection.clone(), queue);
        if let Some(greeting) = greeting {
            session = session.with_greeting(greeting);
        }
        let handle = tokio::spawn(session.run(source, sink));
        (connection, handle)
    }

    /// Validate the configuration and bind the websocket listener.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or if binding fails.
    pub async fn bind(&self) -> Result<TcpListener> {
        self.config.validate()?;
        let listener = TcpListener::bind(&self.config.server.bind_address).await?;
        Ok(listener)
    }

    /// Accept websocket connections until [`shutdown`](Self::shutdown).
    ///
    /// Accept failures are logged and retried; they never stop the loop.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        tracing::info!("Relay listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                _ = self.stopped() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
                        tokio::spawn(protocol::accept_websocket(Arc::clone(&self), stream, peer));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tracing::info!("Relay stopped accepting connections");
        Ok(())
    }

    /// Stop accepting and close every registered connection.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let closed = self.registry.close_all();
        tracing::info!("Shutting down: closing {} connections", closed);
    }

    /// Resolve once [`shutdown`](Self::shutdown) has been called.
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }
}
