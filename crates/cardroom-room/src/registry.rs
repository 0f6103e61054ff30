//! Room registry: creates, tracks, and looks up rooms by name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cardroom_protocol::{PlayerId, RoomId};
use tokio::sync::Mutex;

use crate::heartbeat::HeartbeatMonitor;
use crate::{HistoryEntry, LeaveOutcome, Room, RoomConfig, RoomError, SendOutcome};

/// The map behind the registry lock.
///
/// Heartbeat monitors hold a `Weak` to it so they can unregister their
/// room on exit without keeping the registry alive.
#[derive(Debug, Default)]
pub(crate) struct RoomTable {
    rooms: HashMap<RoomId, Arc<Room>>,
}

impl RoomTable {
    /// Removes `room` only if the entry under its id is still that room;
    /// a newer room registered under the same name is left alone.
    pub(crate) fn remove_if_same(&mut self, room: &Arc<Room>) -> bool {
        match self.rooms.get(room.id()) {
            Some(current) if Arc::ptr_eq(current, room) => {
                self.rooms.remove(room.id());
                true
            }
            _ => false,
        }
    }
}

impl Drop for RoomTable {
    fn drop(&mut self) {
        // Stop every monitor when the registry goes away.
        for room in self.rooms.values() {
            room.terminate();
        }
    }
}

/// Result of [`RoomRegistry::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOutcome {
    /// `true` if this connect created the room.
    pub created: bool,
    /// `false` when the player was already in the room.
    pub newly_joined: bool,
    pub player_count: usize,
}

/// One line of [`RoomRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomListing {
    pub room_id: RoomId,
    /// Present only when players were requested, in join order.
    pub players: Option<Vec<PlayerId>>,
}

/// Process-wide mapping from room name to [`Room`].
///
/// Cheap to clone; clones share the same rooms. The registry lock is only
/// held to read or change the map, never across a room lock or a mailbox
/// wait.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    table: Arc<Mutex<RoomTable>>,
    config: RoomConfig,
}

impl RoomRegistry {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            table: Arc::new(Mutex::new(RoomTable::default())),
            config: config.validated(),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Joins `player` to `room_id`, creating the room (and starting its
    /// heartbeat monitor) if it doesn't exist yet.
    ///
    /// A room that was terminated but not yet unregistered is replaced by
    /// a fresh one, so a connect never lands in a dying room.
    pub async fn connect(&self, room_id: RoomId, player: PlayerId) -> ConnectOutcome {
        loop {
            let (room, created) = self.get_or_create(&room_id).await;
            match room.join(player.clone()).await {
                Ok(joined) => {
                    return ConnectOutcome {
                        created,
                        newly_joined: joined.newly_joined,
                        player_count: joined.player_count,
                    };
                }
                Err(_) => {
                    tracing::debug!(
                        %room_id,
                        %player,
                        "room terminated during connect, retrying"
                    );
                }
            }
        }
    }

    async fn get_or_create(&self, room_id: &RoomId) -> (Arc<Room>, bool) {
        let mut table = self.table.lock().await;
        if let Some(room) = table.rooms.get(room_id) {
            if !room.is_terminated() {
                return (Arc::clone(room), false);
            }
        }

        let room = Arc::new(Room::new(room_id.clone(), self.config.clone()));
        HeartbeatMonitor::spawn(Arc::clone(&room), Arc::downgrade(&self.table));
        table.rooms.insert(room_id.clone(), Arc::clone(&room));
        tracing::info!(%room_id, "room created");
        (room, true)
    }

    /// Looks up a live room.
    ///
    /// A terminated room waiting for its monitor to unregister it is
    /// already treated as gone.
    ///
    /// # Errors
    /// Returns [`RoomError::UnknownRoom`] if absent or terminated.
    pub async fn get(&self, room_id: &RoomId) -> Result<Arc<Room>, RoomError> {
        self.table
            .lock()
            .await
            .rooms
            .get(room_id)
            .filter(|room| !room.is_terminated())
            .cloned()
            .ok_or_else(|| RoomError::UnknownRoom(room_id.clone()))
    }

    /// Deletes `room_id` from the map. Safe to call when absent.
    ///
    /// The removed room is terminated as well so its monitor exits
    /// instead of sweeping an unreachable room.
    pub async fn remove(&self, room_id: &RoomId) {
        let removed = self.table.lock().await.rooms.remove(room_id);
        if let Some(room) = removed {
            room.terminate();
            tracing::info!(%room_id, "room removed");
        }
    }

    /// Administrative force-termination. The room's monitor unregisters it.
    ///
    /// # Errors
    /// Returns [`RoomError::UnknownRoom`] if absent.
    pub async fn clear(&self, room_id: &RoomId) -> Result<(), RoomError> {
        let room = self.get(room_id).await?;
        room.terminate();
        Ok(())
    }

    /// Snapshot of all rooms, ordered by name. Does not touch liveness.
    pub async fn list(&self, include_players: bool) -> Vec<RoomListing> {
        let rooms: Vec<Arc<Room>> = self
            .table
            .lock()
            .await
            .rooms
            .values()
            .filter(|room| !room.is_terminated())
            .cloned()
            .collect();

        let mut listings = Vec::with_capacity(rooms.len());
        for room in rooms {
            let players = if include_players {
                Some(room.players().await.into_iter().map(|p| p.id).collect())
            } else {
                None
            };
            listings.push(RoomListing {
                room_id: room.id().clone(),
                players,
            });
        }
        listings.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        listings
    }

    /// # Errors
    /// [`RoomError::UnknownRoom`] or [`RoomError::UnknownPlayer`].
    pub async fn disconnect(
        &self,
        room_id: &RoomId,
        player: &PlayerId,
    ) -> Result<LeaveOutcome, RoomError> {
        self.get(room_id).await?.leave(player).await
    }

    /// # Errors
    /// [`RoomError::UnknownRoom`].
    pub async fn send(
        &self,
        room_id: &RoomId,
        sender: &PlayerId,
        payload: Bytes,
    ) -> Result<SendOutcome, RoomError> {
        Ok(self.get(room_id).await?.send(sender, payload).await)
    }

    /// # Errors
    /// [`RoomError::UnknownRoom`], [`RoomError::DeliveryTimeout`], or
    /// [`RoomError::MailboxClosed`].
    pub async fn listen(
        &self,
        room_id: &RoomId,
        player: &PlayerId,
        timeout: Duration,
    ) -> Result<Bytes, RoomError> {
        let room = self.get(room_id).await?;
        room.listen(player, timeout).await
    }

    /// # Errors
    /// [`RoomError::UnknownRoom`].
    pub async fn history(&self, room_id: &RoomId) -> Result<Vec<HistoryEntry>, RoomError> {
        Ok(self.get(room_id).await?.history().await)
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.get(room_id).await.is_ok()
    }

    /// Rooms still registered, including terminated ones whose monitor
    /// has not unregistered them yet.
    pub async fn room_count(&self) -> usize {
        self.table.lock().await.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
