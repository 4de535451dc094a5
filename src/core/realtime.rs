//! Notification hub contract.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::Prefixer;

/// Kind of mutation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// Document created.
    Created,
    /// Document updated.
    Updated,
    /// Document deleted.
    Deleted,
    /// Transient notification, nothing persisted.
    Notified,
}

/// Mutation event published on a tenant hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// Storage prefix of the tenant the event belongs to.
    pub prefix: String,
    /// Mutation kind.
    pub verb: Verb,
    /// Document type.
    pub doc_type: String,
    /// Document id.
    pub doc_id: String,
    /// Field subset of the document.
    pub doc: Value,
}

impl RealtimeEvent {
    /// `state` field of the carried document, if any.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.doc.get("state").and_then(Value::as_str)
    }
}

/// Publish/subscribe of entity mutations, scoped by tenant.
pub trait Hub: Send + Sync {
    /// Publish an event to the subscribers of `db`.
    fn publish(&self, db: &dyn Prefixer, event: RealtimeEvent);

    /// Open a subscription on the events of `db`.
    fn subscriber(&self, db: &dyn Prefixer) -> Subscriber;
}

/// Receiving end of a hub subscription.
///
/// Only events matching a watched `(doc_type, doc_id)` pair are returned.
/// Dropping the subscriber closes it.
#[derive(Debug)]
pub struct Subscriber {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    watched: Vec<(String, Option<String>)>,
}

impl Subscriber {
    /// Wrap the receiving half of a hub channel.
    #[must_use]
    pub const fn new(rx: mpsc::UnboundedReceiver<RealtimeEvent>) -> Self {
        Self { rx, watched: Vec::new() }
    }

    /// Watch every document of a type.
    pub fn subscribe(&mut self, doc_type: impl Into<String>) {
        self.watched.push((doc_type.into(), None));
    }

    /// Watch a single document.
    pub fn watch(&mut self, doc_type: impl Into<String>, doc_id: impl Into<String>) {
        self.watched.push((doc_type.into(), Some(doc_id.into())));
    }

    fn is_watched(&self, event: &RealtimeEvent) -> bool {
        self.watched.iter().any(|(doc_type, doc_id)| {
            *doc_type == event.doc_type && doc_id.as_ref().is_none_or(|id| *id == event.doc_id)
        })
    }

    /// Next watched event, or `None` once the hub side is gone.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        loop {
            let event = self.rx.recv().await?;
            if self.is_watched(&event) {
                return Some(event);
            }
        }
    }
}
