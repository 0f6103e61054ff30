//! # Cardroom
//!
//! Long-poll group messaging backend for turn-based card game rooms.
//!
//! Clients join a named room, post opaque payloads that are fanned out to
//! every other member, and long-poll their own mailbox for what the others
//! sent. A per-room heartbeat probes and evicts silent players, and a room
//! disappears once its last player leaves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cardroom::prelude::*;
//!
//! # async fn run() -> Result<(), CardroomError> {
//! let server = CardroomServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

pub mod config;
mod error;
pub mod handler;
pub mod http;
pub mod logging;
mod server;

pub use config::ServerConfig;
pub use error::CardroomError;
pub use server::{shutdown_signal, CardroomServer, CardroomServerBuilder};

/// Convenience re-exports for embedding a server.
pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::error::CardroomError;
    pub use crate::handler::{HandlerError, HistoryFormat, Reply, RequestContext, RequestHandlers};
    pub use crate::server::{CardroomServer, CardroomServerBuilder};

    pub use cardroom_protocol::{Event, HistoryRecord, PlayerId, RoomId, ServerEvent};
    pub use cardroom_room::{RoomConfig, RoomError, RoomRegistry};
}
