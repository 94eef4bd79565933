//! # Event bus for session events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that gives every
//! publisher (supervisor, app manager, update checker) a non-blocking way to
//! report what happened.
//!
//! ```text
//! Publishers (many):                 Subscriber (one):
//!   Supervisor ──┐
//!   ProcessApp ──┼──────► Bus ───────► listener ────► SubscriberSet
//!   Updater    ──┘  (broadcast chan)  (in Supervisor)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: slow receivers observe `Lagged(n)` and skip `n` events.
//! - **No persistence**: events sent with no receiver attached are lost.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for session events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}
