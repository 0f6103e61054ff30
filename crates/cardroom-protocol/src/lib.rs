//! Wire protocol for Cardroom.
//!
//! This crate defines the vocabulary shared by the room engine and the
//! request handlers:
//!
//! - **Identifiers** ([`RoomId`], [`PlayerId`]): string newtypes that key
//!   the registry and each room's player set.
//! - **Events** ([`Event`], [`ServerEvent`]): the `{ name, payload }`
//!   envelope clients exchange, plus the handful of events the server
//!   itself originates.
//! - **History** ([`HistoryRecord`]): the machine-readable rendering of a
//!   room's history.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those types are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! Payloads sent by clients are opaque to the server. The only envelope the
//! room engine ever looks inside is the `HeartbeatCheck` control message,
//! which is never recorded in history.
//!
//! ```text
//! Handlers (bytes) → Protocol (Event / ids) → Room (fan-out, history)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ConnectionParameters, Event, HistoryRecord, PayloadEncoding, PlayerId, RoomId, ServerEvent,
    HEARTBEAT_CHECK, PLAYER_CONNECTED, SERVER_SENDER, TURN_ORDER,
};
