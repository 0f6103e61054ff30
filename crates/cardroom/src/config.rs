//! Server configuration.

use std::time::Duration;

use cardroom_room::RoomConfig;
use serde::{Deserialize, Serialize};

/// Settings for a [`CardroomServer`](crate::CardroomServer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: String,

    /// How long a `listen` request blocks before answering with a
    /// gateway timeout. Clients re-issue the listen afterwards.
    pub listen_timeout: Duration,

    /// Settings applied to every room.
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let room = RoomConfig::default();
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            listen_timeout: room.heartbeat_interval * 4,
            room,
        }
    }
}
