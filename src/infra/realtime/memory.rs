//! In-memory notification hub.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::core::{Hub, Prefixer, RealtimeEvent, Subscriber};

/// Hub fanning events out to the subscribers of each tenant.
///
/// Subscribers whose receiving end was dropped are pruned on publish.
#[derive(Debug, Default)]
pub struct InMemoryHub {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<RealtimeEvent>>>>,
}

impl InMemoryHub {
    /// Create a hub without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers of a tenant.
    #[must_use]
    pub fn subscriber_count(&self, db: &dyn Prefixer) -> usize {
        self.subscribers
            .lock()
            .get(db.db_prefix())
            .map_or(0, |subs| subs.iter().filter(|tx| !tx.is_closed()).count())
    }
}

impl Hub for InMemoryHub {
    fn publish(&self, db: &dyn Prefixer, event: RealtimeEvent) {
        let mut subscribers = self.subscribers.lock();
        if let Some(subs) = subscribers.get_mut(db.db_prefix()) {
            subs.retain(|tx| tx.send(event.clone()).is_ok());
            if subs.is_empty() {
                subscribers.remove(db.db_prefix());
            }
        }
    }

    fn subscriber(&self, db: &dyn Prefixer) -> Subscriber {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .entry(db.db_prefix().to_owned())
            .or_default()
            .push(tx);
        Subscriber::new(rx)
    }
}
