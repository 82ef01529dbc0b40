//! Envelope - the wire unit of relay traffic.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::json::AsciiFormatter;
use crate::{labels, CodecError, PublicKey};

/// A message addressed from one public key to another.
///
/// The relay routes on `to` and never looks inside `content`. `from` is
/// asserted by the sender and carried through unverified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Message kind (opaque to routing)
    #[serde(rename = "LABEL", default)]
    pub label: String,
    /// Recipient key (routing address)
    #[serde(rename = "TO")]
    pub to: PublicKey,
    /// Sender key as asserted by the client
    #[serde(rename = "FROM")]
    pub from: PublicKey,
    /// Opaque payload, base64 inside the JSON
    #[serde(rename = "CONTENT", default, with = "content_base64")]
    pub content: Vec<u8>,
}

impl Envelope {
    /// Create an envelope with an arbitrary label.
    pub fn new(
        label: impl Into<String>,
        to: PublicKey,
        from: PublicKey,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            label: label.into(),
            to,
            from,
            content: content.into(),
        }
    }

    /// Create an ordinary client-to-client message.
    pub fn message(to: PublicKey, from: PublicKey, content: impl Into<Vec<u8>>) -> Self {
        Self::new(labels::MESSAGE, to, from, content)
    }

    /// Create the handshake frame a client sends first.
    pub fn new_connection(key: PublicKey) -> Self {
        Self::new(labels::NEW_CONNECTION, key.clone(), key, Vec::new())
    }

    /// Create the relay's handshake acknowledgement for `key`.
    pub fn ack(key: PublicKey) -> Self {
        Self::new(labels::ACK, key.clone(), key, Vec::new())
    }

    /// Create a routing failure notice delivered to `to`.
    ///
    /// `about` is the key the failed envelope was addressed to.
    pub fn error(to: PublicKey, about: PublicKey, reason: &str) -> Self {
        Self::new(labels::ERROR, to, about, reason.as_bytes())
    }

    /// Whether this envelope carries the given label.
    pub fn has_label(&self, label: &str) -> bool {
        self.label == label
    }

    /// Encode to a wire frame: base64 over ASCII-only JSON.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut json = Vec::with_capacity(64 + 2 * self.content.len());
        let mut serializer = serde_json::Serializer::with_formatter(&mut json, AsciiFormatter);
        self.serialize(&mut serializer)
            .map_err(CodecError::Serialization)?;
        Ok(STANDARD.encode(json).into_bytes())
    }

    /// Decode a wire frame.
    ///
    /// Surrounding ASCII whitespace is ignored. Fails when the frame is not
    /// base64, not a JSON object, lacks `TO` or `FROM`, has unknown keys, or
    /// has a field of the wrong type.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let json = STANDARD
            .decode(frame.trim_ascii())
            .map_err(CodecError::InvalidBase64)?;
        serde_json::from_slice(&json).map_err(CodecError::InvalidEnvelope)
    }
}

mod content_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid base64 content: {e}")))
    }
}
