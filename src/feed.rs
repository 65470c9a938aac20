//! Row-level change notifications published by the store of record.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use uuid::Uuid;

use crate::model::{Store, StoreId, Table, WaitlistEntry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event_type", rename_all = "lowercase")]
pub enum ChangeEvent<T> {
    Insert { new: T },
    Update { old: T, new: T },
    Delete { old: T },
}

impl<T> ChangeEvent<T> {
    pub fn old_row(&self) -> Option<&T> {
        match self {
            ChangeEvent::Insert { .. } => None,
            ChangeEvent::Update { old, .. } | ChangeEvent::Delete { old } => Some(old),
        }
    }

    pub fn new_row(&self) -> Option<&T> {
        match self {
            ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => Some(new),
            ChangeEvent::Delete { .. } => None,
        }
    }

    fn rows(&self) -> impl Iterator<Item = &T> {
        self.old_row().into_iter().chain(self.new_row())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Stores,
    Tables,
    Waitlist,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "collection", rename_all = "lowercase")]
pub enum Change {
    Stores(ChangeEvent<Store>),
    Tables(ChangeEvent<Table>),
    Waitlist(ChangeEvent<WaitlistEntry>),
}

impl Change {
    pub fn collection(&self) -> Collection {
        match self {
            Change::Stores(_) => Collection::Stores,
            Change::Tables(_) => Collection::Tables,
            Change::Waitlist(_) => Collection::Waitlist,
        }
    }

    /// `(row id, owning store id)` for the old and new row of the event.
    fn keys(&self) -> Vec<(Uuid, StoreId)> {
        match self {
            Change::Stores(event) => event.rows().map(|s| (s.id, s.id)).collect(),
            Change::Tables(event) => event.rows().map(|t| (t.id, t.store_id)).collect(),
            Change::Waitlist(event) => event.rows().map(|w| (w.id, w.store_id)).collect(),
        }
    }
}

/// Equality filter for a subscription. `None` fields match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FeedFilter {
    pub collection: Collection,
    pub store_id: Option<StoreId>,
    pub row_id: Option<Uuid>,
}

impl FeedFilter {
    pub fn all(collection: Collection) -> Self {
        Self {
            collection,
            store_id: None,
            row_id: None,
        }
    }

    pub fn store(collection: Collection, store_id: StoreId) -> Self {
        Self {
            collection,
            store_id: Some(store_id),
            row_id: None,
        }
    }

    pub fn row(collection: Collection, row_id: Uuid) -> Self {
        Self {
            collection,
            store_id: None,
            row_id: Some(row_id),
        }
    }

    /// An event passes when either its old or its new row matches, so a row
    /// moving out of the filtered scope is still delivered.
    pub fn matches(&self, change: &Change) -> bool {
        change.collection() == self.collection
            && change.keys().iter().any(|(row_id, store_id)| {
                self.store_id.is_none_or(|s| s == *store_id)
                    && self.row_id.is_none_or(|r| r == *row_id)
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Change(Change),
    /// Events were dropped because this subscriber fell behind; local state must be reloaded.
    Resync { missed: u64 },
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, change: Change) {
        // No subscribers is fine; nobody is watching.
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self, filter: FeedFilter) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Filtered view over the feed. Events arrive in publish order.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<Change>,
    filter: FeedFilter,
}

impl Subscription {
    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    /// Waits for the next matching message. `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(change) if self.filter.matches(&change) => {
                    return Some(FeedMessage::Change(change));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => return Some(FeedMessage::Resync { missed }),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching message already delivered, without waiting.
    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(change) if self.filter.matches(&change) => {
                    return Some(FeedMessage::Change(change));
                }
                Ok(_) => continue,
                Err(TryRecvError::Lagged(missed)) => return Some(FeedMessage::Resync { missed }),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
