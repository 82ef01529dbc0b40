//! Well-known `LABEL` values.
//!
//! Routing treats labels as opaque. The connection handshake, the reader
//! loop's `DISCONNECT` and repeated `NEW_CONNECTION` handling, and the
//! optional routing-failure feedback are the only places that look at them.

/// First frame of a connection; `FROM` carries the presented public key.
pub const NEW_CONNECTION: &str = "NEW_CONNECTION";

/// Ordinary client-to-client message.
pub const MESSAGE: &str = "MESSAGE";

/// Relay acknowledgement of a successful handshake.
pub const ACK: &str = "ACK";

/// Relay-generated routing failure notice.
pub const ERROR: &str = "ERROR";

/// Client announcing it is leaving; the relay closes the connection.
pub const DISCONNECT: &str = "DISCONNECT";
