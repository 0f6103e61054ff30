//! HTTP binding for [`RequestHandlers`].
//!
//! Every route lives under `/game`. Query parameters are validated into a
//! [`RequestContext`] here, and nothing below this module sees axum types.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::rejection::BytesRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::handler::{HandlerError, HistoryFormat, Reply, RequestContext, RequestHandlers, UNKNOWN_ORIGIN};

/// Builds the `/game` router over the given handlers.
pub fn router(handlers: RequestHandlers) -> Router {
    Router::new()
        .route("/game/list", get(list))
        .route("/game/clear", any(clear))
        .route("/game/connect", any(connect))
        .route("/game/disconnect", any(disconnect))
        .route("/game/history", any(history))
        .route("/game/listen", get(listen))
        .route("/game/send", post(send))
        .layer(TraceLayer::new_for_http())
        .with_state(handlers)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Query parameters shared by the `/game` routes.
#[derive(Debug, Default, Deserialize)]
pub struct GameParams {
    #[serde(rename = "gameID")]
    pub game_id: Option<String>,
    pub name: Option<String>,
    pub format: Option<String>,
    pub players: Option<String>,
}

impl GameParams {
    fn context(&self, origin: &Origin) -> Result<RequestContext, HandlerError> {
        RequestContext::from_params(self.game_id.as_deref(), self.name.as_deref(), &origin.0)
    }
}

/// The caller's IP address, or `0.0.0.0` when the server was not started
/// with connect info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin(pub String);

impl<S> FromRequestParts<S> for Origin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let origin = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
        Ok(Self(origin))
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.content_type.as_str())], self.body).into_response()
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.into_reply().into_response()
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

async fn list(State(handlers): State<RequestHandlers>, Query(params): Query<GameParams>) -> Reply {
    let include_players = params.players.is_some_and(|p| !p.is_empty());
    handlers.list(include_players).await
}

async fn clear(
    State(handlers): State<RequestHandlers>,
    Query(params): Query<GameParams>,
) -> Result<Reply, HandlerError> {
    handlers.clear(params.game_id.as_deref()).await
}

async fn connect(
    State(handlers): State<RequestHandlers>,
    origin: Origin,
    Query(params): Query<GameParams>,
) -> Result<Reply, HandlerError> {
    let ctx = params.context(&origin)?;
    Ok(handlers.connect(&ctx).await)
}

async fn disconnect(
    State(handlers): State<RequestHandlers>,
    origin: Origin,
    Query(params): Query<GameParams>,
) -> Result<Reply, HandlerError> {
    let ctx = params.context(&origin)?;
    handlers.disconnect(&ctx).await
}

async fn history(
    State(handlers): State<RequestHandlers>,
    origin: Origin,
    Query(params): Query<GameParams>,
) -> Result<Reply, HandlerError> {
    let ctx = params.context(&origin)?;
    handlers
        .history(&ctx, HistoryFormat::parse(params.format.as_deref()))
        .await
}

async fn listen(
    State(handlers): State<RequestHandlers>,
    origin: Origin,
    Query(params): Query<GameParams>,
) -> Result<Reply, HandlerError> {
    let ctx = params.context(&origin)?;
    handlers.listen(&ctx).await
}

async fn send(
    State(handlers): State<RequestHandlers>,
    origin: Origin,
    Query(params): Query<GameParams>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Reply, HandlerError> {
    let ctx = params.context(&origin)?;
    let body = body.map_err(|e| HandlerError::BodyReadFailure(e.body_text()));
    handlers.send(&ctx, body).await
}
