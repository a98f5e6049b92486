//! Byte encoding of wire messages.
//!
//! Handlers hold a [`Codec`] instead of calling `serde_json` themselves,
//! so the frame format is decided in one place.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Turns messages into frame bytes and back.
///
/// One instance sits in the shared server state and is used from every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    /// # Errors
    /// [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// [`ProtocolError::Decode`] if `data` is not a valid `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON frames, which browsers read natively.
///
/// ```rust
/// use puzzlesync_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let frame = br#"{"type":"operation","payload":{"toggle":"cube-3"}}"#;
/// let msg: ClientMessage<serde_json::Value> = JsonCodec.decode(frame).unwrap();
/// assert!(matches!(msg, ClientMessage::Operation { .. }));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
