//! The store of record: filtered reads, conditional writes, atomic seat
//! counting and a change feed over `stores`, `tables` and `waitlist`.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feed::{FeedFilter, Subscription};
use crate::model::{
    Coordinate, EntryId, Store, StoreId, Table, TableId, TableStatus, WaitlistEntry,
    WaitlistStatus,
};

pub mod memory;
pub mod sea;

pub use memory::InMemoryStore;
pub use sea::SeaOrmStore;

/// Server-side clock. Timestamps are strictly increasing at microsecond
/// resolution, so no two rows written through one store share a `created_at`.
#[derive(Debug, Default)]
pub(crate) struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let previous = self
            .last_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        let stamp = wall.max(previous + 1);
        DateTime::from_timestamp_micros(stamp).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStore {
    pub name: String,
    pub location: Coordinate,
    pub rates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTable {
    pub store_id: StoreId,
    pub rate: String,
    pub max_seats: u32,
    pub status: TableStatus,
}

/// Settings edits. Seat counts are absent: they only move
/// through [`WaitlistStore::adjust_players`] and [`WaitlistStore::seat_entry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePatch {
    pub rate: Option<String>,
    pub max_seats: Option<u32>,
    pub status: Option<TableStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntry {
    pub store_id: StoreId,
    pub player_id: String,
    pub player_name: String,
    pub rate: Option<String>,
    pub arrival_estimate_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableQuery {
    pub store_id: Option<StoreId>,
    pub rate: Option<String>,
    pub status: Option<TableStatus>,
}

impl TableQuery {
    pub fn for_store(store_id: StoreId) -> Self {
        Self {
            store_id: Some(store_id),
            ..Default::default()
        }
    }

    pub fn rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    pub fn status(mut self, status: TableStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, table: &Table) -> bool {
        self.store_id.is_none_or(|id| table.store_id == id)
            && self.rate.as_deref().is_none_or(|rate| table.rate == rate)
            && self.status.is_none_or(|status| table.status == status)
    }
}

/// Equality filters combined with "status in set" and creation-time bounds.
/// Results come back in creation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaitlistQuery {
    pub store_id: Option<StoreId>,
    pub rate: Option<String>,
    pub player_id: Option<String>,
    pub statuses: Option<Vec<WaitlistStatus>>,
    pub created_before: Option<DateTime<Utc>>,
    pub created_after: Option<DateTime<Utc>>,
}

impl WaitlistQuery {
    pub fn for_store(store_id: StoreId) -> Self {
        Self {
            store_id: Some(store_id),
            ..Default::default()
        }
    }

    pub fn rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    pub fn player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    pub fn statuses(mut self, statuses: &[WaitlistStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn matches(&self, entry: &WaitlistEntry) -> bool {
        self.store_id.is_none_or(|id| entry.store_id == id)
            && self.rate.as_deref().is_none_or(|rate| entry.wants_rate(rate))
            && self
                .player_id
                .as_deref()
                .is_none_or(|player| entry.player_id == player)
            && self
                .statuses
                .as_ref()
                .is_none_or(|set| set.contains(&entry.status))
            && self.created_before.is_none_or(|at| entry.created_at < at)
            && self.created_after.is_none_or(|at| entry.created_at > at)
    }
}

/// Backend holding the rows every projection mirrors.
///
/// Implementations must make `adjust_players` and `seat_entry` race-free at
/// the store: two callers contending for the last seat cannot both succeed.
/// Every committed write is published to the change feed.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    async fn list_stores(&self) -> Result<Vec<Store>>;

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>>;

    async fn insert_store(&self, store: NewStore) -> Result<Store>;

    async fn update_store_rates(&self, id: StoreId, rates: Vec<String>) -> Result<Store>;

    /// Relabels a buy-in tier on the store, its tables and its waitlist rows in one transaction.
    async fn rename_rate(&self, store_id: StoreId, from: &str, to: &str) -> Result<Store>;

    async fn list_tables(&self, query: &TableQuery) -> Result<Vec<Table>>;

    async fn get_table(&self, id: TableId) -> Result<Option<Table>>;

    async fn insert_table(&self, table: NewTable) -> Result<Table>;

    /// Fails with `Validation` if `max_seats` would drop below the current player count.
    async fn update_table(&self, id: TableId, patch: TablePatch) -> Result<Table>;

    /// Fails with `Conflict` while anyone is seated at the table.
    async fn delete_table(&self, id: TableId) -> Result<Table>;

    /// Atomically sets `current_players = clamp(current_players + delta, 0, max_seats)`.
    async fn adjust_players(&self, id: TableId, delta: i32) -> Result<Table>;

    async fn list_waitlist(&self, query: &WaitlistQuery) -> Result<Vec<WaitlistEntry>>;

    async fn get_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>>;

    async fn insert_entry(&self, entry: NewEntry) -> Result<WaitlistEntry>;

    /// Moves the entry to `to` only if its current status is one of `expected`.
    /// Returns `None` when the entry is missing or the precondition does not hold.
    async fn transition_entry(
        &self,
        id: EntryId,
        expected: &[WaitlistStatus],
        to: WaitlistStatus,
        called_at: Option<DateTime<Utc>>,
    ) -> Result<Option<WaitlistEntry>>;

    /// Marks the entry seated and takes one seat at the table, all or nothing.
    ///
    /// The bounded increment is applied first and gates the status change: a
    /// table filled concurrently yields `Capacity` and leaves the entry untouched.
    async fn seat_entry(&self, entry_id: EntryId, table_id: TableId)
    -> Result<(WaitlistEntry, Table)>;

    fn subscribe(&self, filter: FeedFilter) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_never_repeats() {
        let clock = MonotonicClock::default();
        let stamps: Vec<_> = (0..1000).map(|_| clock.now()).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
