//! Public key identity type.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::CodecError;

/// An opaque client identifier used as the relay's routing address.
///
/// The relay never interprets the bytes. The only structural rule is that a
/// routable key is non-empty. On the wire it is a standard base64 string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Create a PublicKey from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a PublicKey from its standard base64 form.
    pub fn from_base64(encoded: &str) -> Result<Self, CodecError> {
        STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(CodecError::InvalidBase64)
    }

    /// Get the raw bytes of this key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the key has no bytes (and therefore cannot be routed to).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Standard base64 form, as carried on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Short hex fingerprint for logs (first 8 bytes).
    pub fn fingerprint(&self) -> String {
        let end = self.0.len().min(8);
        hex::encode(&self.0[..end])
    }
}

impl From<&[u8]> for PublicKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for PublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

struct PublicKeyVisitor;

impl Visitor<'_> for PublicKeyVisitor {
    type Value = PublicKey;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a base64-encoded public key string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        STANDARD
            .decode(v)
            .map(PublicKey)
            .map_err(|e| E::custom(format!("invalid base64 key: {e}")))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(PublicKeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip_is_byte_exact() {
        let key = PublicKey::from_bytes(vec![0u8, 255, 1, 254, 0]);
        let restored = PublicKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(restored, key);
        assert_eq!(restored.as_bytes(), &[0u8, 255, 1, 254, 0]);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(PublicKey::from_base64("not base64!").is_err());
    }

    #[test]
    fn fingerprint_is_short_hex() {
        let key = PublicKey::from_bytes(vec![0xab; 32]);
        assert_eq!(key.fingerprint(), "abababababababab");
        assert_eq!(PublicKey::from_bytes(vec![1, 2]).fingerprint(), "0102");
        assert_eq!(format!("{:?}", key), "PublicKey(abababababababab)");
    }

    #[test]
    fn empty_key_is_empty() {
        assert!(PublicKey::default().is_empty());
        assert!(!PublicKey::from(&b"k"[..]).is_empty());
    }
}
