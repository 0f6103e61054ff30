//! Codec trait and the JSON implementation.
//!
//! The room engine encodes the events it originates (introductions, turn
//! order, heartbeat probes) and the handlers encode structured history.
//! Both go through the [`Codec`] trait so neither depends on a concrete
//! format.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a codec is shared by every request task
/// and by every room's heartbeat monitor.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// The card-game client speaks JSON, so this is the only codec the server
/// needs.
///
/// ## Example
///
/// ```rust
/// use cardroom_protocol::{Codec, Event, JsonCodec};
///
/// let codec = JsonCodec;
/// let event = Event::new("EndTurn", serde_json::json!({ "turn": 3 }));
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: Event = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
