//! Per-player mailboxes.
//!
//! A mailbox is a bounded FIFO of payloads. The room keeps the
//! [`Mailbox`] itself; request tasks get cheap handles to either end
//! ([`MailboxSender`], [`MailboxListener`]) and do their waiting on those
//! handles after the room lock has been released.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};

/// Outcome of a bounded-wait delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The mailbox stayed full for the whole timeout.
    Dropped,
    /// The mailbox no longer has a reader (player left).
    Closed,
}

/// Why a blocking receive ended without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    TimedOut,
    Closed,
}

/// A player's queue of pending payloads.
///
/// Dropping the mailbox drops its own sender; once in-flight deliveries
/// finish, waiting listeners observe [`RecvError::Closed`].
#[derive(Debug)]
pub struct Mailbox {
    tx: mpsc::Sender<Bytes>,
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl Mailbox {
    /// # Panics
    /// Panics if `capacity` is 0; [`RoomConfig::validated`](crate::RoomConfig::validated)
    /// rules that out.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn sender(&self) -> MailboxSender {
        MailboxSender {
            tx: self.tx.clone(),
        }
    }

    pub fn listener(&self) -> MailboxListener {
        MailboxListener {
            rx: Arc::clone(&self.rx),
        }
    }
}

/// Write end of a mailbox.
#[derive(Debug, Clone)]
pub struct MailboxSender {
    tx: mpsc::Sender<Bytes>,
}

impl MailboxSender {
    /// Enqueues `payload`, waiting up to `timeout` for space if the
    /// mailbox is full.
    pub async fn deliver(&self, payload: Bytes, timeout: Duration) -> Delivery {
        match self.tx.send_timeout(payload, timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => Delivery::Dropped,
            Err(mpsc::error::SendTimeoutError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Read end of a mailbox.
///
/// Clones share one receiver, so two concurrent listens for the same
/// player take turns rather than both receiving the same payload.
#[derive(Debug, Clone)]
pub struct MailboxListener {
    rx: Arc<Mutex<mpsc::Receiver<Bytes>>>,
}

impl MailboxListener {
    /// Waits up to `timeout` for the next payload. Time spent queued
    /// behind another listener counts against the timeout.
    pub async fn recv_timeout(&self, timeout: Duration) -> Result<Bytes, RecvError> {
        let recv = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };
        match tokio::time::timeout(timeout, recv).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(RecvError::Closed),
            Err(_) => Err(RecvError::TimedOut),
        }
    }
}
