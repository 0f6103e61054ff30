//! Error types for the protocol layer.
//!
//! Each crate in Cardroom defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in encoding, decoding, or
//! identifier validation, not in room bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// or a payload that is not JSON at all.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The input passed deserialization but is not acceptable,
    /// e.g. an empty room identifier.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
