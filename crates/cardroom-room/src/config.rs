//! Room configuration and lifecycle state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Timing and capacity settings shared by every room in a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Pending payloads a player's mailbox holds before senders wait.
    pub mailbox_capacity: usize,

    /// How long a fan-out delivery waits for space in a full mailbox
    /// before the payload is dropped for that recipient.
    pub delivery_timeout: Duration,

    /// How often the heartbeat monitor sweeps the room.
    pub heartbeat_interval: Duration,

    /// Idle time after which a player is sent a `HeartbeatCheck` probe.
    pub probe_after: Duration,

    /// Idle time after which a player is evicted. Must be at least
    /// `probe_after`.
    pub evict_after: Duration,

    /// How long a probe waits for mailbox space.
    pub probe_timeout: Duration,

    /// Upper bound of the random delay added to a monitor's first sweep,
    /// so rooms created at the same instant don't sweep in lockstep.
    pub initial_jitter: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 20,
            delivery_timeout: Duration::from_secs(4),
            heartbeat_interval: Duration::from_secs(40),
            probe_after: Duration::from_secs(40),
            evict_after: Duration::from_secs(80),
            probe_timeout: Duration::from_secs(4),
            initial_jitter: Duration::from_secs(2),
        }
    }
}

impl RoomConfig {
    /// Shortest accepted heartbeat interval.
    pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called by [`RoomRegistry::new`](crate::RoomRegistry::new). Rules:
    /// - `mailbox_capacity` is at least 1.
    /// - `heartbeat_interval` is at least [`Self::MIN_HEARTBEAT_INTERVAL`].
    /// - `evict_after` is forced ≥ `probe_after`.
    pub fn validated(mut self) -> Self {
        if self.mailbox_capacity == 0 {
            tracing::warn!("mailbox_capacity of 0 is unusable, using 1");
            self.mailbox_capacity = 1;
        }
        if self.heartbeat_interval < Self::MIN_HEARTBEAT_INTERVAL {
            tracing::warn!(
                interval_ms = self.heartbeat_interval.as_millis() as u64,
                "heartbeat_interval below minimum, clamping"
            );
            self.heartbeat_interval = Self::MIN_HEARTBEAT_INTERVAL;
        }
        if self.evict_after < self.probe_after {
            tracing::warn!(
                probe_after_ms = self.probe_after.as_millis() as u64,
                evict_after_ms = self.evict_after.as_millis() as u64,
                "evict_after shorter than probe_after, raising it"
            );
            self.evict_after = self.probe_after;
        }
        self
    }

    /// Derives probe and eviction thresholds from a single interval:
    /// probe after one interval of silence, evict after two.
    pub fn with_heartbeat_interval(interval: Duration) -> Self {
        Self {
            heartbeat_interval: interval,
            probe_after: interval,
            evict_after: interval * 2,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// RoomState
// ---------------------------------------------------------------------------

/// The lifecycle state of a room, as observed by its heartbeat monitor.
///
/// ```text
/// Active → Terminated
/// ```
///
/// `Terminated` is final. Every path that empties a room (disconnect,
/// eviction, administrative clear) ends here, and the monitor reacts by
/// unregistering the room and exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Active,
    Terminated,
}

impl RoomState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}
