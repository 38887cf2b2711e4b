//! Fan-out of committed changes to subscribers.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use crate::models::ChangeEvent;

/// A change event stamped with its position in the feed.
///
/// Every write returns the sequence number of the event it published, so a
/// writer can recognise its own changes when they come back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub seq: u64,
    pub event: ChangeEvent,
}

#[derive(Debug, Default)]
struct FeedState {
    subscribers: Vec<Sender<FeedEvent>>,
    last_seq: u64,
}

/// Broadcasts change events to every live subscriber.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    state: Mutex<FeedState>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Receiver<FeedEvent> {
        let (tx, rx) = channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Send to all subscribers, dropping those that hung up.
    ///
    /// Returns the sequence number stamped on the event.
    pub fn publish(&self, event: ChangeEvent) -> u64 {
        let mut state = self.lock();
        state.last_seq += 1;
        let stamped = FeedEvent {
            seq: state.last_seq,
            event,
        };
        state
            .subscribers
            .retain(|tx| tx.send(stamped.clone()).is_ok());
        tracing::debug!(
            id = stamped.event.id(),
            seq = stamped.seq,
            subscribers = state.subscribers.len(),
            "published change event"
        );
        stamped.seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}
