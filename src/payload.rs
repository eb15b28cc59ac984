//! Message payloads.
//!
//! Payloads travel as raw bytes; text and byte inputs are sent exactly as
//! given, and [`Payload::json`] is the thin utility that turns any
//! serializable value into a structured text encoding before sending.
//! Handlers receive the bytes exactly as published, with no decoding policy
//! imposed by the bus.

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// An opaque message payload.
///
/// Clones are cheap; the underlying buffer is shared during fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    /// An empty payload, as carried by the liveness probe messages.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Serialize a value to JSON text.
    ///
    /// # Errors
    /// Returns [`crate::BusError::Serialize`] if the value cannot be
    /// represented as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_vec(value)?.into()))
    }

    /// The raw bytes, exactly as published.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the payload, returning the shared buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(text.into_bytes().into())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_passes_through_unchanged() {
        let payload = Payload::from("Hello");
        assert_eq!(payload.as_str(), Some("Hello"));
        assert_eq!(payload.as_bytes(), b"Hello");
    }

    #[test]
    fn test_json_encodes_structured_values() {
        #[derive(Serialize)]
        struct Greeting<'a> {
            msg: &'a str,
        }

        let payload = Payload::json(&Greeting { msg: "Hi" }).unwrap();
        assert_eq!(payload.as_str(), Some(r#"{"msg":"Hi"}"#));
    }

    #[test]
    fn test_empty() {
        let payload = Payload::empty();
        assert!(payload.is_empty());
        assert_eq!(payload.len(), 0);
    }
}
