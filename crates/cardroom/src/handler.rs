//! Request handlers: translate one inbound request into registry calls.
//!
//! Handlers know nothing about HTTP. Each takes a validated
//! [`RequestContext`] and returns a [`Reply`] (status code, content type,
//! body) or a [`HandlerError`] that knows its own status code. The HTTP
//! binding in [`crate::http`] only extracts parameters and writes replies.

use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use cardroom_protocol::{Codec, HistoryRecord, JsonCodec, PlayerId, ProtocolError, RoomId};
use cardroom_room::{RoomError, RoomRegistry};

/// Origin used when the peer address is unavailable.
pub const UNKNOWN_ORIGIN: &str = "0.0.0.0";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a request failed. Every variant is local to the request.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A required query parameter is absent or blank.
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyReadFailure(String),

    /// History or event encoding failed.
    #[error("failed to serialize response: {0}")]
    SerializationFailure(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl HandlerError {
    /// The status code this failure is reported with.
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingParameter(_) => 400,
            Self::BodyReadFailure(_) | Self::SerializationFailure(_) => 500,
            Self::Room(RoomError::DeliveryTimeout(..)) => 504,
            Self::Room(
                RoomError::UnknownRoom(_) | RoomError::UnknownPlayer(..) | RoomError::MailboxClosed(_),
            ) => 400,
        }
    }

    pub fn into_reply(self) -> Reply {
        Reply::text(self.status(), format!("{self}\n"))
    }
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// The room and player a request acts on, validated once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub room_id: RoomId,
    pub player_id: PlayerId,
}

impl RequestContext {
    /// Builds the context from raw `gameID` / `name` parameters and the
    /// caller's origin.
    ///
    /// # Errors
    /// [`HandlerError::MissingParameter`] if either parameter is absent or
    /// blank.
    pub fn from_params(
        game_id: Option<&str>,
        name: Option<&str>,
        origin: &str,
    ) -> Result<Self, HandlerError> {
        let room_id = parse_room(game_id)?;
        let name = name.ok_or(HandlerError::MissingParameter("name"))?;
        let player_id = PlayerId::compose(origin, name)
            .map_err(|_| HandlerError::MissingParameter("name"))?;
        Ok(Self { room_id, player_id })
    }
}

fn parse_room(game_id: Option<&str>) -> Result<RoomId, HandlerError> {
    game_id
        .and_then(|raw| RoomId::parse(raw).ok())
        .ok_or(HandlerError::MissingParameter("gameID"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Text,
    Json,
    OctetStream,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Json => "application/json",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

/// A transport-agnostic response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: ContentType,
    pub body: Bytes,
}

impl Reply {
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: ContentType::Text,
            body: Bytes::from(body.into()),
        }
    }

    pub fn ok_text(body: impl Into<String>) -> Self {
        Self::text(200, body)
    }

    pub fn empty() -> Self {
        Self::ok_text(String::new())
    }
}

/// How `history` renders its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryFormat {
    #[default]
    Text,
    Json,
}

impl HistoryFormat {
    /// `json` in any letter case selects JSON; anything else is text.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(f) if f.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// The full set of request operations over one [`RoomRegistry`].
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct RequestHandlers {
    registry: RoomRegistry,
    listen_timeout: Duration,
    codec: JsonCodec,
}

impl RequestHandlers {
    pub fn new(registry: RoomRegistry, listen_timeout: Duration) -> Self {
        Self {
            registry,
            listen_timeout,
            codec: JsonCodec,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Lists rooms, optionally with their players.
    pub async fn list(&self, include_players: bool) -> Reply {
        let rooms = self.registry.list(include_players).await;

        let mut body = String::from("Room list!\n");
        if rooms.is_empty() {
            body.push_str("No rooms setup.");
            return Reply::ok_text(body);
        }
        for room in rooms {
            let _ = writeln!(body, "- {}", room.room_id);
            match room.players {
                Some(players) if players.is_empty() => body.push_str("   No players connected.\n"),
                Some(players) => {
                    for player in players {
                        let _ = writeln!(body, "   {player}");
                    }
                }
                None => {}
            }
        }
        Reply::ok_text(body)
    }

    /// Joins the caller to the room, creating it on first connect.
    pub async fn connect(&self, ctx: &RequestContext) -> Reply {
        let RequestContext { room_id, player_id } = ctx;
        let outcome = self.registry.connect(room_id.clone(), player_id.clone()).await;

        let mut body = format!("Connecting to game {room_id}\n");
        if outcome.created {
            body.push_str("Created a new game.\n");
        } else {
            let _ = writeln!(body, "Existing game {room_id} connected to.");
        }
        Reply::ok_text(body)
    }

    /// # Errors
    /// Unknown room or player → 400.
    pub async fn disconnect(&self, ctx: &RequestContext) -> Result<Reply, HandlerError> {
        self.registry.disconnect(&ctx.room_id, &ctx.player_id).await?;
        Ok(Reply::ok_text("Disconnected from the game.\n"))
    }

    /// Records and fans out the request body.
    ///
    /// The room is checked before the body, so a request for an unknown
    /// room is a 400 even if its body was also unreadable.
    ///
    /// # Errors
    /// Unknown room → 400, unreadable body → 500.
    pub async fn send(
        &self,
        ctx: &RequestContext,
        body: Result<Bytes, HandlerError>,
    ) -> Result<Reply, HandlerError> {
        let room = self.registry.get(&ctx.room_id).await?;
        let payload = body.inspect_err(|e| {
            tracing::warn!(room_id = %ctx.room_id, player = %ctx.player_id, error = %e, "send body unreadable");
        })?;
        room.send(&ctx.player_id, payload).await;
        Ok(Reply::empty())
    }

    /// Long-polls the caller's mailbox.
    ///
    /// # Errors
    /// Unknown room → 400, nothing within the listen timeout → 504.
    pub async fn listen(&self, ctx: &RequestContext) -> Result<Reply, HandlerError> {
        let payload = self
            .registry
            .listen(&ctx.room_id, &ctx.player_id, self.listen_timeout)
            .await
            .inspect_err(|e| {
                if matches!(e, RoomError::DeliveryTimeout(..)) {
                    tracing::debug!(room_id = %ctx.room_id, player = %ctx.player_id, "listen timed out");
                }
            })?;
        Ok(Reply {
            status: 200,
            content_type: ContentType::OctetStream,
            body: payload,
        })
    }

    /// Renders the room's history for the caller.
    ///
    /// # Errors
    /// Unknown room → 400, encoding failure → 500.
    pub async fn history(
        &self,
        ctx: &RequestContext,
        format: HistoryFormat,
    ) -> Result<Reply, HandlerError> {
        let entries = self.registry.history(&ctx.room_id).await?;
        tracing::debug!(
            room_id = %ctx.room_id,
            player = %ctx.player_id,
            ?format,
            entries = entries.len(),
            "history requested"
        );

        match format {
            HistoryFormat::Json => {
                let records: Vec<HistoryRecord> = entries.iter().map(|e| e.to_record()).collect();
                let body = self.codec.encode(&records)?;
                Ok(Reply {
                    status: 200,
                    content_type: ContentType::Json,
                    body: Bytes::from(body),
                })
            }
            HistoryFormat::Text => {
                let mut body = format!(
                    "Game History for {} as requested by {}:\n",
                    ctx.room_id, ctx.player_id
                );
                body.push_str("-----------------------\n");
                for entry in &entries {
                    let arrow = if entry.sender == ctx.player_id { "<--" } else { "-->" };
                    let _ = writeln!(
                        body,
                        "{} {} {}",
                        entry.sender,
                        arrow,
                        String::from_utf8_lossy(&entry.payload)
                    );
                }
                Ok(Reply::ok_text(body))
            }
        }
    }

    /// Force-terminates a room. Only needs `gameID`.
    ///
    /// # Errors
    /// Missing `gameID` or unknown room → 400.
    pub async fn clear(&self, game_id: Option<&str>) -> Result<Reply, HandlerError> {
        let room_id = parse_room(game_id)?;
        self.registry.clear(&room_id).await?;
        tracing::info!(%room_id, "room cleared by request");
        Ok(Reply::ok_text(format!("Cleaning up the game:{room_id}!\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardroom_room::RoomConfig;

    fn handlers() -> RequestHandlers {
        RequestHandlers::new(
            RoomRegistry::new(RoomConfig::default()),
            Duration::from_millis(100),
        )
    }

    fn ctx(room: &str, name: &str) -> RequestContext {
        RequestContext::from_params(Some(room), Some(name), "10.0.0.1").unwrap()
    }

    fn body(reply: &Reply) -> String {
        String::from_utf8(reply.body.to_vec()).unwrap()
    }

    // =====================================================================
    // RequestContext
    // =====================================================================

    #[test]
    fn test_context_composes_player_from_origin() {
        let ctx = ctx("g1", "ann");
        assert_eq!(ctx.room_id, RoomId::from("g1"));
        assert_eq!(ctx.player_id, PlayerId::from("10.0.0.1/ann"));
    }

    #[test]
    fn test_context_missing_parameters() {
        let err = RequestContext::from_params(None, Some("ann"), "x").unwrap_err();
        assert!(matches!(err, HandlerError::MissingParameter("gameID")));
        assert_eq!(err.status(), 400);

        let err = RequestContext::from_params(Some("g1"), None, "x").unwrap_err();
        assert!(matches!(err, HandlerError::MissingParameter("name")));

        let err = RequestContext::from_params(Some(""), Some("ann"), "x").unwrap_err();
        assert!(matches!(err, HandlerError::MissingParameter("gameID")));
    }

    #[test]
    fn test_history_format_parse() {
        assert_eq!(HistoryFormat::parse(Some("json")), HistoryFormat::Json);
        assert_eq!(HistoryFormat::parse(Some("JSON")), HistoryFormat::Json);
        assert_eq!(HistoryFormat::parse(Some("text")), HistoryFormat::Text);
        assert_eq!(HistoryFormat::parse(None), HistoryFormat::Text);
    }

    #[test]
    fn test_error_status_codes() {
        let room = RoomId::from("g1");
        let player = PlayerId::from("p");
        assert_eq!(HandlerError::from(RoomError::UnknownRoom(room.clone())).status(), 400);
        assert_eq!(
            HandlerError::from(RoomError::UnknownPlayer(player.clone(), room)).status(),
            400
        );
        assert_eq!(
            HandlerError::from(RoomError::DeliveryTimeout(player, Duration::from_secs(1))).status(),
            504
        );
        assert_eq!(HandlerError::BodyReadFailure("eof".into()).status(), 500);
    }

    // =====================================================================
    // Operations
    // =====================================================================

    #[tokio::test]
    async fn test_list_empty() {
        let reply = handlers().list(true).await;
        assert_eq!(body(&reply), "Room list!\nNo rooms setup.");
    }

    #[tokio::test]
    async fn test_connect_then_list_with_players() {
        let h = handlers();
        let first = h.connect(&ctx("g1", "ann")).await;
        assert_eq!(body(&first), "Connecting to game g1\nCreated a new game.\n");
        let second = h.connect(&ctx("g1", "bob")).await;
        assert_eq!(
            body(&second),
            "Connecting to game g1\nExisting game g1 connected to.\n"
        );

        let reply = h.list(true).await;
        assert_eq!(
            body(&reply),
            "Room list!\n- g1\n   10.0.0.1/ann\n   10.0.0.1/bob\n"
        );
        assert_eq!(body(&h.list(false).await), "Room list!\n- g1\n");
    }

    #[tokio::test]
    async fn test_unknown_room_is_400_everywhere() {
        let h = handlers();
        let c = ctx("nowhere", "ann");
        assert_eq!(h.disconnect(&c).await.unwrap_err().status(), 400);
        assert_eq!(h.send(&c, Ok(Bytes::from("x"))).await.unwrap_err().status(), 400);
        assert_eq!(h.listen(&c).await.unwrap_err().status(), 400);
        assert_eq!(
            h.history(&c, HistoryFormat::Text).await.unwrap_err().status(),
            400
        );
        assert_eq!(h.clear(Some("nowhere")).await.unwrap_err().status(), 400);
    }

    #[tokio::test]
    async fn test_send_unknown_room_wins_over_bad_body() {
        let h = handlers();
        let err = h
            .send(&ctx("nowhere", "ann"), Err(HandlerError::BodyReadFailure("eof".into())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn test_send_unreadable_body_is_500() {
        let h = handlers();
        h.connect(&ctx("g1", "ann")).await;
        let err = h
            .send(&ctx("g1", "ann"), Err(HandlerError::BodyReadFailure("eof".into())))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 500);
        assert!(h.registry().history(&RoomId::from("g1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listen_timeout_is_504() {
        let h = handlers();
        h.connect(&ctx("g1", "ann")).await;
        let err = h.listen(&ctx("g1", "ann")).await.unwrap_err();
        assert_eq!(err.status(), 504);
    }

    #[tokio::test]
    async fn test_history_text_marks_direction() {
        let h = handlers();
        let (ann, bob) = (ctx("g1", "ann"), ctx("g1", "bob"));
        h.connect(&ann).await;
        h.connect(&bob).await;
        h.send(&ann, Ok(Bytes::from("hello"))).await.unwrap();
        h.send(&bob, Ok(Bytes::from("hi"))).await.unwrap();

        let reply = h.history(&ann, HistoryFormat::Text).await.unwrap();
        assert_eq!(
            body(&reply),
            "Game History for g1 as requested by 10.0.0.1/ann:\n\
             -----------------------\n\
             10.0.0.1/ann <-- hello\n\
             10.0.0.1/bob --> hi\n"
        );
    }

    #[tokio::test]
    async fn test_history_json_round_trips_sends() {
        let h = handlers();
        let (ann, bob) = (ctx("g1", "ann"), ctx("g1", "bob"));
        h.connect(&ann).await;
        h.connect(&bob).await;
        h.send(&ann, Ok(Bytes::from(r#"{"name":"Play","payload":1}"#))).await.unwrap();
        h.send(&bob, Ok(Bytes::from("plain text"))).await.unwrap();
        h.send(&ann, Ok(Bytes::from(r#"{"name":"HeartbeatCheck"}"#))).await.unwrap();
        h.send(&bob, Ok(Bytes::from_static(&[255, 0, 254]))).await.unwrap();

        let reply = h.history(&bob, HistoryFormat::Json).await.unwrap();
        assert_eq!(reply.content_type, ContentType::Json);

        let records: Vec<HistoryRecord> = JsonCodec.decode(&reply.body).unwrap();
        let pairs: Vec<(String, Vec<u8>)> = records
            .iter()
            .map(|r| (r.user.0.clone(), r.payload_bytes().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("10.0.0.1/ann".to_string(), br#"{"name":"Play","payload":1}"#.to_vec()),
                ("10.0.0.1/bob".to_string(), b"plain text".to_vec()),
                ("10.0.0.1/bob".to_string(), vec![255, 0, 254]),
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_then_clear() {
        let h = handlers();
        let ann = ctx("g1", "ann");
        h.connect(&ann).await;
        h.connect(&ctx("g1", "bob")).await;

        let reply = h.disconnect(&ann).await.unwrap();
        assert_eq!(body(&reply), "Disconnected from the game.\n");
        assert_eq!(h.disconnect(&ann).await.unwrap_err().status(), 400);

        let reply = h.clear(Some("g1")).await.unwrap();
        assert_eq!(body(&reply), "Cleaning up the game:g1!\n");
        assert_eq!(
            h.history(&ann, HistoryFormat::Json).await.unwrap_err().status(),
            400
        );
    }

    #[tokio::test]
    async fn test_clear_requires_game_id() {
        let err = handlers().clear(None).await.unwrap_err();
        assert!(matches!(err, HandlerError::MissingParameter("gameID")));
    }
}
