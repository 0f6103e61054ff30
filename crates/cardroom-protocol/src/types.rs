//! Core protocol types for Cardroom's wire format.
//!
//! Identifiers are plain strings on the wire; the newtypes here exist so a
//! room id can never be passed where a player id is expected.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Event name of the liveness probe. The only name the room engine
/// interprets: a client echoing it back is never recorded in history.
pub const HEARTBEAT_CHECK: &str = "HeartbeatCheck";

/// Event name used to introduce players to each other on connect.
pub const PLAYER_CONNECTED: &str = "PlayerConnected";

/// Event name used to tell each of the first two players whether they start.
pub const TURN_ORDER: &str = "TurnOrder";

/// Sender name stamped on events the server originates.
pub const SERVER_SENDER: &str = "THE SERVER";

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The name of a room ("game id" in client requests).
///
/// `#[serde(transparent)]` serializes this as the bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Validates a raw room name.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if the name is empty
    /// or only whitespace.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("empty room id".into()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The logical identity of a player inside a room.
///
/// Composed from the caller's network origin and the display name they
/// supplied, separated by `/`. Two requests from the same origin with the
/// same name are the same player; this is what lets a client come back
/// after a dropped long poll without being treated as a stranger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Separator between the origin and the display name.
    pub const SEPARATOR: char = '/';

    /// Builds the identifier for `name` calling from `origin`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if `name` is empty.
    pub fn compose(origin: &str, name: &str) -> Result<Self, ProtocolError> {
        if name.trim().is_empty() {
            return Err(ProtocolError::InvalidMessage("empty player name".into()));
        }
        Ok(Self(format!("{origin}{}{name}", Self::SEPARATOR)))
    }

    /// The display-name part of the identifier.
    ///
    /// Identifiers built without an origin are returned whole.
    pub fn display_name(&self) -> &str {
        self.0
            .split_once(Self::SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Event envelope
// ---------------------------------------------------------------------------

/// The `{ name, payload }` envelope every game event travels in.
///
/// The payload shape belongs to the game client; the server keeps it as an
/// untyped JSON value. A missing payload decodes as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Returns `true` if `data` decodes as an envelope named
    /// [`HEARTBEAT_CHECK`]. Anything that is not an envelope at all
    /// (plain text, other JSON shapes) is not a heartbeat.
    pub fn is_heartbeat_check(data: &[u8]) -> bool {
        #[derive(Deserialize)]
        struct NameOnly {
            name: String,
        }

        serde_json::from_slice::<NameOnly>(data)
            .map(|env| env.name == HEARTBEAT_CHECK)
            .unwrap_or(false)
    }
}

/// The parameters block every server-originated payload carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParameters {
    pub player_id: String,
}

/// Events the server itself puts into player mailboxes.
///
/// None of these are ever recorded in a room's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// `player` (a display name) is in the room.
    PlayerConnected { player: String },

    /// Tells `player` whether they take the first turn.
    TurnOrder { player: String, goes_first: bool },

    /// "Are you still there?" sent to a player that has gone quiet.
    HeartbeatCheck,
}

impl ServerEvent {
    /// Converts to the envelope clients receive.
    pub fn to_event(&self) -> Event {
        match self {
            Self::PlayerConnected { player } => Event::new(
                PLAYER_CONNECTED,
                serde_json::json!({ "parameters": params(player) }),
            ),
            Self::TurnOrder { player, goes_first } => Event::new(
                TURN_ORDER,
                serde_json::json!({
                    "parameters": params(player),
                    "goes_first": goes_first,
                }),
            ),
            Self::HeartbeatCheck => Event::new(
                HEARTBEAT_CHECK,
                serde_json::json!({ "parameters": params(SERVER_SENDER) }),
            ),
        }
    }
}

fn params(player: &str) -> ConnectionParameters {
    ConnectionParameters {
        player_id: player.to_string(),
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One history entry in its machine-readable form.
///
/// `seq` is the arrival order within the room (0-based). A UTF-8 payload
/// is carried as-is; anything else is base64 and tagged with `encoding`,
/// which is omitted for the common UTF-8 case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub seq: u64,
    pub user: PlayerId,
    pub payload: String,
    #[serde(default, skip_serializing_if = "PayloadEncoding::is_utf8")]
    pub encoding: PayloadEncoding,
}

/// How [`HistoryRecord::payload`] represents the original bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    #[default]
    Utf8,
    Base64,
}

impl PayloadEncoding {
    pub fn is_utf8(&self) -> bool {
        matches!(self, Self::Utf8)
    }
}

impl HistoryRecord {
    /// Picks the encoding that preserves `payload` exactly.
    pub fn new(seq: u64, user: PlayerId, payload: &[u8]) -> Self {
        let (payload, encoding) = match std::str::from_utf8(payload) {
            Ok(text) => (text.to_string(), PayloadEncoding::Utf8),
            Err(_) => (BASE64.encode(payload), PayloadEncoding::Base64),
        };
        Self {
            seq,
            user,
            payload,
            encoding,
        }
    }

    /// The original payload bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidMessage`] if a base64 payload is
    /// malformed.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        match self.encoding {
            PayloadEncoding::Utf8 => Ok(self.payload.as_bytes().to_vec()),
            PayloadEncoding::Base64 => BASE64
                .decode(&self.payload)
                .map_err(|e| ProtocolError::InvalidMessage(format!("bad base64 payload: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Identifiers
    // =====================================================================

    #[test]
    fn test_player_id_compose_uses_separator() {
        let id = PlayerId::compose("10.0.0.1", "ann").unwrap();
        assert_eq!(id.as_str(), "10.0.0.1/ann");
        assert_eq!(id.display_name(), "ann");
    }

    #[test]
    fn test_player_id_same_origin_and_name_is_same_player() {
        let a = PlayerId::compose("10.0.0.1", "ann").unwrap();
        let b = PlayerId::compose("10.0.0.1", "ann").unwrap();
        let c = PlayerId::compose("10.0.0.2", "ann").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_player_id_compose_rejects_empty_name() {
        assert!(PlayerId::compose("10.0.0.1", "").is_err());
        assert!(PlayerId::compose("10.0.0.1", "   ").is_err());
    }

    #[test]
    fn test_player_id_display_name_without_origin() {
        assert_eq!(PlayerId::from("solo").display_name(), "solo");
    }

    #[test]
    fn test_room_id_parse_rejects_blank() {
        assert!(RoomId::parse("").is_err());
        assert!(RoomId::parse(" ").is_err());
        assert_eq!(RoomId::parse("g1").unwrap(), RoomId::from("g1"));
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_value(RoomId::from("g1")).unwrap();
        assert_eq!(json, "g1");
        let json = serde_json::to_value(PlayerId::from("x/ann")).unwrap();
        assert_eq!(json, "x/ann");
    }

    // =====================================================================
    // Events
    // =====================================================================

    #[test]
    fn test_event_missing_payload_decodes_as_null() {
        let event: Event = serde_json::from_str(r#"{"name":"Shuffle"}"#).unwrap();
        assert_eq!(event.name, "Shuffle");
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_is_heartbeat_check_recognises_envelope() {
        let probe = serde_json::to_vec(&ServerEvent::HeartbeatCheck.to_event()).unwrap();
        assert!(Event::is_heartbeat_check(&probe));
        assert!(Event::is_heartbeat_check(br#"{"name":"HeartbeatCheck"}"#));
    }

    #[test]
    fn test_is_heartbeat_check_ignores_other_payloads() {
        assert!(!Event::is_heartbeat_check(b"hello"));
        assert!(!Event::is_heartbeat_check(br#"{"name":"PlayEvent","payload":{}}"#));
        assert!(!Event::is_heartbeat_check(br#"["HeartbeatCheck"]"#));
    }

    #[test]
    fn test_player_connected_event_shape() {
        let event = ServerEvent::PlayerConnected {
            player: "ann".into(),
        }
        .to_event();
        assert_eq!(event.name, PLAYER_CONNECTED);
        assert_eq!(event.payload["parameters"]["player_id"], "ann");
    }

    #[test]
    fn test_turn_order_event_shape() {
        let event = ServerEvent::TurnOrder {
            player: "bob".into(),
            goes_first: false,
        }
        .to_event();
        assert_eq!(event.name, TURN_ORDER);
        assert_eq!(event.payload["parameters"]["player_id"], "bob");
        assert_eq!(event.payload["goes_first"], false);
    }

    #[test]
    fn test_heartbeat_check_is_signed_by_server() {
        let event = ServerEvent::HeartbeatCheck.to_event();
        assert_eq!(event.payload["parameters"]["player_id"], SERVER_SENDER);
    }

    // =====================================================================
    // History
    // =====================================================================

    #[test]
    fn test_history_record_keeps_utf8_payload_as_text() {
        let record = HistoryRecord::new(0, PlayerId::from("x/ann"), br#"{"name":"Play"}"#);
        assert_eq!(record.encoding, PayloadEncoding::Utf8);
        assert_eq!(record.payload, r#"{"name":"Play"}"#);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("encoding").is_none());
    }

    #[test]
    fn test_history_record_binary_payload_survives_json() {
        let raw = [255u8, 0, 254];
        let record = HistoryRecord::new(3, PlayerId::from("x/bob"), &raw);
        assert_eq!(record.encoding, PayloadEncoding::Base64);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""encoding":"base64""#));
        let decoded: HistoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.payload_bytes().unwrap(), raw.to_vec());
        assert_eq!(decoded.user, PlayerId::from("x/bob"));
    }

    #[test]
    fn test_history_record_without_encoding_field_is_utf8() {
        let decoded: HistoryRecord =
            serde_json::from_str(r#"{"seq":0,"user":"x/ann","payload":"hi"}"#).unwrap();
        assert_eq!(decoded.payload_bytes().unwrap(), b"hi".to_vec());
    }

    #[test]
    fn test_history_record_malformed_base64_is_invalid() {
        let decoded: HistoryRecord = serde_json::from_str(
            r#"{"seq":0,"user":"x/ann","payload":"!!","encoding":"base64"}"#,
        )
        .unwrap();
        assert!(matches!(
            decoded.payload_bytes(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }
}
