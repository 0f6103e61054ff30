//! Per-room heartbeat monitor.
//!
//! One task per room, spawned when the room is created. It sweeps the room
//! on a fixed interval and waits on the room's termination signal at the
//! same time:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = state.wait_for(RoomState::is_terminated) => break,
//!         _ = ticker.tick() => room.sweep().await,
//!     }
//! }
//! // unregister the room, exit
//! ```
//!
//! Exiting is the only way a room leaves the registry, so every path that
//! empties a room funnels through exactly one removal.

use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::registry::RoomTable;
use crate::{Room, RoomState};

pub(crate) struct HeartbeatMonitor {
    room: Arc<Room>,
    table: Weak<Mutex<RoomTable>>,
}

impl HeartbeatMonitor {
    pub(crate) fn spawn(room: Arc<Room>, table: Weak<Mutex<RoomTable>>) -> JoinHandle<()> {
        let monitor = Self { room, table };
        tokio::spawn(monitor.run())
    }

    async fn run(self) {
        let room_id = self.room.id().clone();
        let config = self.room.config();
        let interval = config.heartbeat_interval;

        let first = Instant::now() + interval + jitter(config.initial_jitter);
        let mut ticker = time::interval_at(first, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut state = self.room.subscribe();

        tracing::debug!(
            %room_id,
            interval_ms = interval.as_millis() as u64,
            "heartbeat monitor started"
        );

        loop {
            tokio::select! {
                biased;
                // Err means the room itself is gone; treat it like termination.
                _ = async { state.wait_for(RoomState::is_terminated).await.is_ok() } => break,
                _ = ticker.tick() => {
                    let outcome = self.room.sweep().await;
                    tracing::trace!(
                        %room_id,
                        probed = outcome.probed.len(),
                        evicted = outcome.evicted.len(),
                        "heartbeat sweep"
                    );
                }
            }
        }

        if let Some(table) = self.table.upgrade() {
            table.lock().await.remove_if_same(&self.room);
        }
        tracing::info!(%room_id, "heartbeat monitor stopped, room removed");
    }
}

fn jitter(max: Duration) -> Duration {
    let max_us = max.as_micros() as u64;
    if max_us == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..max_us))
}
