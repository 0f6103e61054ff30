//! A single room: players, their mailboxes, and the append-only history.
//!
//! All bookkeeping sits behind one lock per room. Anything that can block
//! for seconds (delivering into a full mailbox, waiting on an empty one)
//! happens on mailbox handles cloned out while the lock was held, after
//! it has been released.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use cardroom_protocol::{Codec, HistoryRecord, JsonCodec, PlayerId, RoomId, ServerEvent};
use futures_util::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

use crate::mailbox::{Delivery, Mailbox, MailboxListener, MailboxSender, RecvError};
use crate::{RoomConfig, RoomError, RoomState};

// ---------------------------------------------------------------------------
// Public records
// ---------------------------------------------------------------------------

/// Liveness bookkeeping for one player.
#[derive(Debug, Clone)]
pub struct PlayerState {
    pub id: PlayerId,
    /// Refreshed on connect, on every send, and on every delivered listen.
    pub last_seen: Instant,
    /// Position in the room's join sequence; lower joined earlier.
    pub join_order: u64,
}

impl PlayerState {
    fn seen(&mut self) {
        self.last_seen = Instant::now();
    }
}

/// One appended payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub seq: u64,
    pub sender: PlayerId,
    pub payload: Bytes,
}

impl HistoryEntry {
    pub fn to_record(&self) -> HistoryRecord {
        HistoryRecord::new(self.seq, self.sender.clone(), &self.payload)
    }
}

/// Result of [`Room::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// `false` when the player was already in the room and only had
    /// its liveness refreshed.
    pub newly_joined: bool,
    pub player_count: usize,
}

/// Result of [`Room::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A `HeartbeatCheck` reply: liveness refreshed, nothing recorded.
    HeartbeatAcknowledged,
    Recorded {
        seq: u64,
        delivered: usize,
        dropped: usize,
    },
}

/// Result of [`Room::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub remaining: usize,
    /// `true` if this departure emptied the room and fired termination.
    pub terminated: bool,
}

/// Result of one heartbeat sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub probed: Vec<PlayerId>,
    pub evicted: Vec<PlayerId>,
    /// Mailboxes dropped for having no player across two sweeps.
    pub reaped: Vec<PlayerId>,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Members {
    players: HashMap<PlayerId, PlayerState>,
    mailboxes: HashMap<PlayerId, Mailbox>,
    history: Vec<HistoryEntry>,
    next_join_order: u64,
    /// Mailboxes with no matching player at the last sweep.
    orphans: HashSet<PlayerId>,
}

impl Members {
    fn mailbox(&mut self, player: &PlayerId, capacity: usize) -> &Mailbox {
        self.mailboxes
            .entry(player.clone())
            .or_insert_with(|| Mailbox::new(capacity))
    }
}

/// A payload addressed to one mailbox, staged under the lock and
/// delivered after it is released.
struct Outgoing {
    to: PlayerId,
    mailbox: MailboxSender,
    payload: Bytes,
}

/// A named channel with its own players, mailboxes, and history.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    config: RoomConfig,
    members: Mutex<Members>,
    state: watch::Sender<RoomState>,
}

impl Room {
    pub(crate) fn new(id: RoomId, config: RoomConfig) -> Self {
        let (state, _) = watch::channel(RoomState::Active);
        Self {
            id,
            config,
            members: Mutex::new(Members::default()),
            state,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -- Lifecycle --------------------------------------------------------

    /// Fires the termination signal. Returns `true` only for the call
    /// that actually moved the room to `Terminated`; later calls are no-ops.
    pub fn terminate(&self) -> bool {
        let fired = self.state.send_if_modified(|state| {
            if state.is_terminated() {
                false
            } else {
                *state = RoomState::Terminated;
                true
            }
        });
        if fired {
            tracing::info!(room_id = %self.id, "room terminated");
        }
        fired
    }

    pub fn is_terminated(&self) -> bool {
        self.state.borrow().is_terminated()
    }

    pub fn state(&self) -> RoomState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle changes. The heartbeat monitor holds one.
    pub fn subscribe(&self) -> watch::Receiver<RoomState> {
        self.state.subscribe()
    }

    // -- Membership -------------------------------------------------------

    /// Adds `player`, or refreshes it if already present.
    ///
    /// A newcomer is introduced to everyone already in the room and vice
    /// versa. When the newcomer makes the room exactly two players, both
    /// are told who takes the first turn (earlier joiner starts).
    ///
    /// # Errors
    /// Returns [`RoomError::UnknownRoom`] if the room was terminated before
    /// the player could be added; the registry retries on a fresh room.
    pub async fn join(&self, player: PlayerId) -> Result<JoinOutcome, RoomError> {
        let (outcome, outgoing) = {
            let mut members = self.members.lock().await;
            if self.is_terminated() {
                return Err(RoomError::UnknownRoom(self.id.clone()));
            }

            members.mailbox(&player, self.config.mailbox_capacity);

            if let Some(existing) = members.players.get_mut(&player) {
                existing.seen();
                let outcome = JoinOutcome {
                    newly_joined: false,
                    player_count: members.players.len(),
                };
                tracing::debug!(room_id = %self.id, %player, "player reconnected");
                return Ok(outcome);
            }

            let join_order = members.next_join_order;
            members.next_join_order += 1;
            members.players.insert(
                player.clone(),
                PlayerState {
                    id: player.clone(),
                    last_seen: Instant::now(),
                    join_order,
                },
            );

            let outgoing = self.introductions(&members, &player);
            let outcome = JoinOutcome {
                newly_joined: true,
                player_count: members.players.len(),
            };
            (outcome, outgoing)
        };

        tracing::info!(
            room_id = %self.id,
            %player,
            players = outcome.player_count,
            "player joined"
        );

        self.fan_out(outgoing, self.config.delivery_timeout).await;
        Ok(outcome)
    }

    /// Stages the connect-time events for a newcomer.
    fn introductions(&self, members: &Members, newcomer: &PlayerId) -> Vec<Outgoing> {
        let mut outgoing = Vec::new();
        let Some(newcomer_box) = members.mailboxes.get(newcomer).map(Mailbox::sender) else {
            return outgoing;
        };

        let announce = self.encode(&ServerEvent::PlayerConnected {
            player: newcomer.display_name().to_string(),
        });

        for other in members.players.keys().filter(|id| *id != newcomer) {
            if let (Some(payload), Some(mailbox)) = (&announce, members.mailboxes.get(other)) {
                outgoing.push(Outgoing {
                    to: other.clone(),
                    mailbox: mailbox.sender(),
                    payload: payload.clone(),
                });
            }
            let introduce = self.encode(&ServerEvent::PlayerConnected {
                player: other.display_name().to_string(),
            });
            if let Some(payload) = introduce {
                outgoing.push(Outgoing {
                    to: newcomer.clone(),
                    mailbox: newcomer_box.clone(),
                    payload,
                });
            }
        }

        if members.players.len() == 2 {
            let mut pair: Vec<&PlayerState> = members.players.values().collect();
            pair.sort_by_key(|p| p.join_order);
            for (position, state) in pair.into_iter().enumerate() {
                let event = ServerEvent::TurnOrder {
                    player: state.id.display_name().to_string(),
                    goes_first: position == 0,
                };
                if let (Some(payload), Some(mailbox)) =
                    (self.encode(&event), members.mailboxes.get(&state.id))
                {
                    outgoing.push(Outgoing {
                        to: state.id.clone(),
                        mailbox: mailbox.sender(),
                        payload,
                    });
                }
            }
        }

        outgoing
    }

    /// Removes `player` and its mailbox. Empties the room → termination.
    ///
    /// # Errors
    /// Returns [`RoomError::UnknownPlayer`] if the player is not present.
    pub async fn leave(&self, player: &PlayerId) -> Result<LeaveOutcome, RoomError> {
        let mut members = self.members.lock().await;
        if members.players.remove(player).is_none() {
            return Err(RoomError::UnknownPlayer(player.clone(), self.id.clone()));
        }
        members.mailboxes.remove(player);
        let remaining = members.players.len();
        // Under the lock: join checks termination under the same lock.
        let terminated = remaining == 0 && self.terminate();
        drop(members);

        tracing::info!(room_id = %self.id, %player, players = remaining, "player left");

        Ok(LeaveOutcome {
            remaining,
            terminated,
        })
    }

    // -- Messaging --------------------------------------------------------

    /// Records `payload` from `sender` and fans it out to every other
    /// mailbox in the room.
    ///
    /// A `HeartbeatCheck` envelope only refreshes the sender's liveness.
    /// Per-recipient delivery failures are logged and counted, never
    /// returned.
    pub async fn send(&self, sender: &PlayerId, payload: Bytes) -> SendOutcome {
        let (seq, outgoing) = {
            let mut members = self.members.lock().await;
            if let Some(state) = members.players.get_mut(sender) {
                state.seen();
            }

            if cardroom_protocol::Event::is_heartbeat_check(&payload) {
                tracing::trace!(room_id = %self.id, %sender, "heartbeat acknowledged");
                return SendOutcome::HeartbeatAcknowledged;
            }

            let seq = members.history.len() as u64;
            members.history.push(HistoryEntry {
                seq,
                sender: sender.clone(),
                payload: payload.clone(),
            });

            let outgoing: Vec<Outgoing> = members
                .mailboxes
                .iter()
                .filter(|(id, _)| *id != sender)
                .map(|(id, mailbox)| Outgoing {
                    to: id.clone(),
                    mailbox: mailbox.sender(),
                    payload: payload.clone(),
                })
                .collect();
            (seq, outgoing)
        };

        tracing::debug!(
            room_id = %self.id,
            %sender,
            seq,
            recipients = outgoing.len(),
            "payload recorded"
        );

        let (delivered, dropped) = self.fan_out(outgoing, self.config.delivery_timeout).await;
        SendOutcome::Recorded {
            seq,
            delivered,
            dropped,
        }
    }

    /// Long-polls `player`'s mailbox, creating it if this listen arrived
    /// before the player's connect. A delivered payload refreshes liveness.
    ///
    /// # Errors
    /// - [`RoomError::DeliveryTimeout`] if nothing arrived in time.
    /// - [`RoomError::MailboxClosed`] if the player left or the room was
    ///   terminated while waiting.
    pub async fn listen(&self, player: &PlayerId, timeout: Duration) -> Result<Bytes, RoomError> {
        let listener = self.listener(player).await;
        let mut state = self.subscribe();

        let received = tokio::select! {
            biased;
            received = listener.recv_timeout(timeout) => received,
            _ = async { state.wait_for(RoomState::is_terminated).await.is_ok() } => {
                Err(RecvError::Closed)
            }
        };
        let payload = received.map_err(|e| match e {
            RecvError::TimedOut => RoomError::DeliveryTimeout(player.clone(), timeout),
            RecvError::Closed => RoomError::MailboxClosed(player.clone()),
        })?;

        if let Some(state) = self.members.lock().await.players.get_mut(player) {
            state.seen();
        }
        Ok(payload)
    }

    async fn listener(&self, player: &PlayerId) -> MailboxListener {
        let mut members = self.members.lock().await;
        members
            .mailbox(player, self.config.mailbox_capacity)
            .listener()
    }

    /// Delivers staged payloads concurrently. Returns `(delivered, dropped)`.
    async fn fan_out(&self, outgoing: Vec<Outgoing>, timeout: Duration) -> (usize, usize) {
        let results = join_all(outgoing.into_iter().map(|out| async move {
            let result = out.mailbox.deliver(out.payload, timeout).await;
            (out.to, result)
        }))
        .await;

        let mut delivered = 0;
        let mut dropped = 0;
        for (to, result) in results {
            match result {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped => {
                    dropped += 1;
                    tracing::warn!(room_id = %self.id, player = %to, "mailbox full, payload dropped");
                }
                Delivery::Closed => {
                    dropped += 1;
                    tracing::debug!(room_id = %self.id, player = %to, "mailbox closed, payload dropped");
                }
            }
        }
        (delivered, dropped)
    }

    fn encode(&self, event: &ServerEvent) -> Option<Bytes> {
        match JsonCodec.encode(&event.to_event()) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!(room_id = %self.id, error = %e, "failed to encode server event");
                None
            }
        }
    }

    // -- Heartbeat --------------------------------------------------------

    /// Probes idle players and evicts silent ones.
    ///
    /// A player idle longer than `evict_after` is removed with its mailbox;
    /// one idle longer than `probe_after` (but not evicted) gets a
    /// `HeartbeatCheck`. Probe failures never evict on their own. If
    /// eviction empties the room, termination fires. Mailboxes left behind
    /// by listens from non-members are dropped on their second sweep.
    pub async fn sweep(&self) -> SweepOutcome {
        let now = Instant::now();
        let (outgoing, evicted, reaped) = {
            let mut members = self.members.lock().await;
            let mut evicted = Vec::new();
            let mut idle = Vec::new();
            for (id, state) in &members.players {
                let silent_for = now.saturating_duration_since(state.last_seen);
                if silent_for > self.config.evict_after {
                    evicted.push(id.clone());
                } else if silent_for > self.config.probe_after {
                    idle.push(id.clone());
                }
            }

            for id in &evicted {
                members.players.remove(id);
                members.mailboxes.remove(id);
            }

            // A mailbox without a player is kept for one sweep so a listen
            // that arrives before its connect survives; after that it goes.
            let (reaped, pending): (Vec<PlayerId>, Vec<PlayerId>) = members
                .mailboxes
                .keys()
                .filter(|id| !members.players.contains_key(*id))
                .cloned()
                .partition(|id| members.orphans.contains(id));
            for id in &reaped {
                members.mailboxes.remove(id);
            }
            members.orphans = pending.into_iter().collect();

            let probe = if idle.is_empty() {
                None
            } else {
                self.encode(&ServerEvent::HeartbeatCheck)
            };
            let outgoing: Vec<Outgoing> = match probe {
                Some(payload) => idle
                    .iter()
                    .filter_map(|id| {
                        members.mailboxes.get(id).map(|mailbox| Outgoing {
                            to: id.clone(),
                            mailbox: mailbox.sender(),
                            payload: payload.clone(),
                        })
                    })
                    .collect(),
                None => Vec::new(),
            };

            if !evicted.is_empty() && members.players.is_empty() {
                self.terminate();
            }
            (outgoing, evicted, reaped)
        };

        for player in &evicted {
            tracing::info!(room_id = %self.id, %player, "evicting unresponsive player");
        }
        for player in &reaped {
            tracing::debug!(room_id = %self.id, %player, "dropping mailbox with no player");
        }

        let probed: Vec<PlayerId> = outgoing.iter().map(|out| out.to.clone()).collect();
        for player in &probed {
            tracing::debug!(room_id = %self.id, %player, "probing idle player");
        }
        self.fan_out(outgoing, self.config.probe_timeout).await;

        SweepOutcome {
            probed,
            evicted,
            reaped,
        }
    }

    // -- Queries ----------------------------------------------------------

    /// Players in join order.
    pub async fn players(&self) -> Vec<PlayerState> {
        let members = self.members.lock().await;
        let mut players: Vec<PlayerState> = members.players.values().cloned().collect();
        players.sort_by_key(|p| p.join_order);
        players
    }

    pub async fn player_count(&self) -> usize {
        self.members.lock().await.players.len()
    }

    pub async fn has_mailbox(&self, player: &PlayerId) -> bool {
        self.members.lock().await.mailboxes.contains_key(player)
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.members.lock().await.history.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardroom_protocol::Event;

    const WAIT: Duration = Duration::from_millis(100);

    fn room() -> Room {
        Room::new(RoomId::from("g1"), RoomConfig::default())
    }

    fn pid(name: &str) -> PlayerId {
        PlayerId::compose("127.0.0.1", name).unwrap()
    }

    fn decode(bytes: &Bytes) -> Event {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_join_first_player_gets_no_events() {
        let room = room();
        let outcome = room.join(pid("ann")).await.unwrap();
        assert!(outcome.newly_joined);
        assert_eq!(outcome.player_count, 1);

        let err = room.listen(&pid("ann"), WAIT).await.unwrap_err();
        assert!(matches!(err, RoomError::DeliveryTimeout(..)));
    }

    #[tokio::test]
    async fn test_rejoin_refreshes_without_broadcast() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        room.join(pid("bob")).await.unwrap();
        // drain ann: PlayerConnected(bob), TurnOrder
        room.listen(&pid("ann"), WAIT).await.unwrap();
        room.listen(&pid("ann"), WAIT).await.unwrap();

        let outcome = room.join(pid("bob")).await.unwrap();
        assert!(!outcome.newly_joined);
        assert_eq!(outcome.player_count, 2);
        assert!(room.listen(&pid("ann"), WAIT).await.is_err());
    }

    #[tokio::test]
    async fn test_send_skips_sender_and_records_once() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        room.join(pid("bob")).await.unwrap();

        let outcome = room.send(&pid("ann"), Bytes::from("hello")).await;
        assert_eq!(
            outcome,
            SendOutcome::Recorded {
                seq: 0,
                delivered: 1,
                dropped: 0
            }
        );
        assert_eq!(room.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_send_heartbeat_is_not_recorded() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        let outcome = room
            .send(&pid("ann"), Bytes::from_static(br#"{"name":"HeartbeatCheck"}"#))
            .await;
        assert_eq!(outcome, SendOutcome::HeartbeatAcknowledged);
        assert!(room.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_unknown_player() {
        let room = room();
        let err = room.leave(&pid("ghost")).await.unwrap_err();
        assert_eq!(err, RoomError::UnknownPlayer(pid("ghost"), RoomId::from("g1")));
        assert!(!room.is_terminated());
    }

    #[tokio::test]
    async fn test_leave_last_player_terminates() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        let outcome = room.leave(&pid("ann")).await.unwrap();
        assert_eq!(
            outcome,
            LeaveOutcome {
                remaining: 0,
                terminated: true
            }
        );
        assert!(room.is_terminated());
        assert!(!room.has_mailbox(&pid("ann")).await);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let room = room();
        assert!(room.terminate());
        assert!(!room.terminate());
        assert_eq!(room.state(), RoomState::Terminated);
    }

    #[tokio::test]
    async fn test_join_terminated_room_fails() {
        let room = room();
        room.terminate();
        assert!(matches!(
            room.join(pid("ann")).await,
            Err(RoomError::UnknownRoom(_))
        ));
    }

    #[tokio::test]
    async fn test_listen_before_connect_creates_mailbox() {
        let room = room();
        assert!(room.listen(&pid("early"), WAIT).await.is_err());
        assert!(room.has_mailbox(&pid("early")).await);
        assert_eq!(room.player_count().await, 0);
    }

    #[tokio::test]
    async fn test_introductions_reach_both_sides() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        room.join(pid("bob")).await.unwrap();
        room.join(pid("cat")).await.unwrap();

        // cat is introduced to ann and bob (order unspecified), no turn order.
        let mut names = vec![
            decode(&room.listen(&pid("cat"), WAIT).await.unwrap()).payload["parameters"]
                ["player_id"]
                .as_str()
                .unwrap()
                .to_string(),
            decode(&room.listen(&pid("cat"), WAIT).await.unwrap()).payload["parameters"]
                ["player_id"]
                .as_str()
                .unwrap()
                .to_string(),
        ];
        names.sort();
        assert_eq!(names, vec!["ann", "bob"]);
        assert!(room.listen(&pid("cat"), WAIT).await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_drops_playerless_mailbox_on_second_sweep() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        assert!(room.listen(&pid("ghost"), WAIT).await.is_err());

        let first = room.sweep().await;
        assert!(first.reaped.is_empty());
        assert!(room.has_mailbox(&pid("ghost")).await);

        let second = room.sweep().await;
        assert_eq!(second.reaped, vec![pid("ghost")]);
        assert!(!room.has_mailbox(&pid("ghost")).await);
        assert!(room.has_mailbox(&pid("ann")).await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_early_mailbox_once_player_joins() {
        let room = room();
        assert!(room.listen(&pid("early"), WAIT).await.is_err());
        room.sweep().await;
        room.join(pid("early")).await.unwrap();

        let outcome = room.sweep().await;
        assert!(outcome.reaped.is_empty());
        assert!(room.has_mailbox(&pid("early")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminate_wakes_pending_listen() {
        let room = std::sync::Arc::new(room());
        room.join(pid("ann")).await.unwrap();

        let listening = tokio::spawn({
            let room = std::sync::Arc::clone(&room);
            async move { room.listen(&pid("ann"), Duration::from_secs(160)).await }
        });
        tokio::task::yield_now().await;
        room.terminate();

        let result = tokio::time::timeout(Duration::from_secs(1), listening)
            .await
            .expect("listen should end on termination")
            .unwrap();
        assert_eq!(result, Err(RoomError::MailboxClosed(pid("ann"))));
    }

    #[tokio::test]
    async fn test_queued_payload_still_delivered_after_terminate() {
        let room = room();
        room.join(pid("ann")).await.unwrap();
        room.join(pid("bob")).await.unwrap();
        room.terminate();

        // bob's introduction was queued before termination.
        let event = decode(&room.listen(&pid("ann"), WAIT).await.unwrap());
        assert_eq!(event.name, cardroom_protocol::PLAYER_CONNECTED);
    }
}
