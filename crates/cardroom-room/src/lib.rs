//! Room lifecycle and message fan-out for Cardroom.
//!
//! Rooms are named, short-lived channels. Each one owns its players,
//! their mailboxes, and an append-only history, all behind a single
//! room-scoped lock, plus a heartbeat monitor task that evicts silent
//! players and unregisters the room once it empties.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: creates rooms on first connect, looks them up, lists them
//! - [`Room`]: membership, fan-out, long-poll listen, history
//! - [`Mailbox`]: per-player bounded queue with timed send and receive
//! - [`RoomConfig`]: capacities and heartbeat thresholds
//! - [`RoomState`]: `Active → Terminated`

mod config;
mod error;
mod heartbeat;
mod mailbox;
mod registry;
mod room;

pub use config::{RoomConfig, RoomState};
pub use error::RoomError;
pub use mailbox::{Delivery, Mailbox, MailboxListener, MailboxSender, RecvError};
pub use registry::{ConnectOutcome, RoomListing, RoomRegistry};
pub use room::{
    HistoryEntry, JoinOutcome, LeaveOutcome, PlayerState, Room, SendOutcome, SweepOutcome,
};
