//! # nullref-relay
//!
//! Public-key addressed message relay.
//!
//! This crate implements a relay server that:
//! - Accepts websocket connections, each identified by a client public key
//! - Routes envelopes to whichever connection is registered under `TO`
//! - Never stores messages: offline recipients are an error, not a queue
//! - Never inspects `CONTENT`
//!
//! ## Architecture
//!
//! ```text
//! Client A ──┐                         ┌── Client B
//!            │   websocket (base64     │
//!            │   JSON envelopes)       │
//!        ┌───┴─────────────────────────┴───┐
//!        │          nullref-relay          │
//!        │  reader ─► Router ─► Registry   │
//!        │                 │               │
//!        │                 ▼               │
//!        │   delivery queue ─► writer      │
//!        └─────────────────────────────────┘
//! ```
//!
//! Each connection runs a reader loop and a writer loop. Readers never wait
//! on a recipient: a full delivery queue drops the envelope.
//!
//! ## Protocol
//!
//! - NEW_CONNECTION (first frame, `FROM` = client key) → ACK
//! - any other envelope is routed to `TO` unchanged

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod limits;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod transport;

pub use config::Config;
pub use connection::{Connection, ConnectionState};
pub use error::{RelayError, RouteError};
pub use registry::Registry;
pub use router::Router;
pub use server::{RelayMetrics, RelayServer};
pub use session::SessionEnd;
