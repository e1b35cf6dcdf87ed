//! Transport-neutral encoding of wire payloads.
//!
//! Every payload is wrapped in a versioned envelope before it leaves the
//! node, so a node can reject messages produced by an incompatible peer
//! instead of misinterpreting them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// Envelope schema version written by this build
pub const WIRE_SCHEMA_VERSION: u16 = 1;

/// Errors produced while encoding or decoding payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CodecError {
    /// Value could not be serialized
    #[error("Encode failed: {reason}")]
    Encode {
        /// Underlying serializer message
        reason: String,
    },
    /// Bytes could not be deserialized
    #[error("Decode failed: {reason}")]
    Decode {
        /// Underlying deserializer message
        reason: String,
    },
    /// Envelope was written by an incompatible schema
    #[error("Unsupported wire schema version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the envelope
        found: u16,
        /// Version this build understands
        expected: u16,
    },
}

/// Bidirectional mapping between a domain value and its wire bytes.
pub trait Codec<T>: Send + Sync {
    /// Encode a value
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes produced by `encode`
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

#[derive(Serialize)]
struct WireEnvelope<'a, T> {
    schema_version: u16,
    body: &'a T,
}

#[derive(Deserialize)]
struct RawEnvelope {
    schema_version: u16,
    body: serde_json::Value,
}

/// JSON codec used by every Concord channel.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Create a codec
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&WireEnvelope {
            schema_version: WIRE_SCHEMA_VERSION,
            body: value,
        })
        .map_err(|e| CodecError::Encode {
            reason: e.to_string(),
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let envelope: RawEnvelope =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
                reason: e.to_string(),
            })?;
        if envelope.schema_version != WIRE_SCHEMA_VERSION {
            return Err(CodecError::UnsupportedVersion {
                found: envelope.schema_version,
                expected: WIRE_SCHEMA_VERSION,
            });
        }
        serde_json::from_value(envelope.body).map_err(|e| CodecError::Decode {
            reason: e.to_string(),
        })
    }
}
