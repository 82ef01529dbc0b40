//! # relay-types
//!
//! Wire format types for the nullref public-key relay.
//!
//! This crate provides the types shared by the relay and its clients:
//! - [`PublicKey`] - Opaque client identity used as the routing address
//! - [`Envelope`] - The unit of relay traffic (`LABEL`, `TO`, `FROM`, `CONTENT`)
//! - [`labels`] - Well-known `LABEL` values
//! - [`CodecError`] - Encoding and decoding failures
//!
//! ## Wire format
//!
//! Each frame is a base64-encoded, ASCII-only JSON object with exactly the
//! keys `LABEL`, `TO`, `FROM` and `CONTENT`. Keys and content are themselves
//! base64 strings inside the JSON so they survive the round trip byte-exact.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod json;
mod key;
pub mod labels;

pub use envelope::Envelope;
pub use error::CodecError;
pub use key::PublicKey;
