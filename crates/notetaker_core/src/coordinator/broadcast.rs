//! Best-effort `notesUpdated` fan-out.
//!
//! # Invariants
//! - Publishing never fails and never blocks the dispatch loop.
//! - Delivery is at-most-once: a context that is not subscribed misses the
//!   update, and a lagging one is told to re-fetch.
//! - Only the coordinator holds a strong sender; listeners see `Closed` as
//!   soon as it stops.

use crate::model::note::Note;
use crate::protocol::Notification;
use log::debug;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// What a listening context observes on its notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Full collection after a mutation.
    Notes(Vec<Note>),
    /// `n` updates were dropped; re-fetch with `getNotes`.
    Lagged(u64),
    /// The coordinator is gone.
    Closed,
}

/// Sending side held by the coordinator.
pub struct NotesBroadcaster {
    sender: broadcast::Sender<Notification>,
}

impl NotesBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes the full collection; returns how many listeners were reached.
    pub fn publish(&self, notes: &[Note]) -> usize {
        let reached = self
            .sender
            .send(Notification::NotesUpdated(notes.to_vec()))
            .unwrap_or(0);
        debug!(
            "event=notes_broadcast module=coordinator status=ok notes={} listeners={reached}",
            notes.len()
        );
        reached
    }

    /// Subscription point that does not keep the channel open.
    pub fn subscriptions(&self) -> NotesSubscriptions {
        NotesSubscriptions {
            sender: self.sender.downgrade(),
        }
    }
}

/// Weak subscription point handed out with coordinator handles.
#[derive(Clone)]
pub struct NotesSubscriptions {
    sender: broadcast::WeakSender<Notification>,
}

impl NotesSubscriptions {
    /// Subscribes while the broadcaster lives; afterwards the returned
    /// receiver is already closed.
    pub fn subscribe(&self) -> NotificationReceiver {
        let inner = match self.sender.upgrade() {
            Some(sender) => sender.subscribe(),
            None => {
                let (_, closed) = broadcast::channel(1);
                closed
            }
        };
        NotificationReceiver { inner }
    }
}

/// Receiving side held by a panel or page agent.
pub struct NotificationReceiver {
    inner: broadcast::Receiver<Notification>,
}

impl NotificationReceiver {
    /// Waits for the next delivery.
    pub async fn recv(&mut self) -> Delivery {
        match self.inner.recv().await {
            Ok(notification) => into_delivery(notification),
            Err(RecvError::Lagged(skipped)) => Delivery::Lagged(skipped),
            Err(RecvError::Closed) => Delivery::Closed,
        }
    }

    /// Returns a pending delivery without waiting, or `None` when idle.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.inner.try_recv() {
            Ok(notification) => Some(into_delivery(notification)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Lagged(skipped)) => Some(Delivery::Lagged(skipped)),
            Err(TryRecvError::Closed) => Some(Delivery::Closed),
        }
    }
}

fn into_delivery(notification: Notification) -> Delivery {
    match notification {
        Notification::NotesUpdated(notes) => Delivery::Notes(notes),
    }
}
