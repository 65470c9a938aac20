//! Process-local store used for mock mode and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    MonotonicClock, NewEntry, NewStore, NewTable, TablePatch, TableQuery, WaitlistQuery,
    WaitlistStore,
};
use crate::error::{Result, WaitlistError};
use crate::feed::{Change, ChangeEvent, ChangeFeed, FeedFilter, Subscription};
use crate::model::{EntryId, Store, StoreId, Table, TableId, WaitlistEntry, WaitlistStatus};

#[derive(Debug, Default)]
struct Rows {
    stores: HashMap<StoreId, Store>,
    tables: HashMap<TableId, Table>,
    waitlist: HashMap<EntryId, WaitlistEntry>,
}

/// All rows behind one mutex; every write holds it for its whole check-and-set.
#[derive(Debug)]
pub struct InMemoryStore {
    rows: Mutex<Rows>,
    clock: MonotonicClock,
    feed: ChangeFeed,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_feed(ChangeFeed::default())
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            rows: Mutex::new(Rows::default()),
            clock: MonotonicClock::default(),
            feed,
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Simulates an outage: every call fails with `StoreUnavailable` until restored.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delays every call, for exercising caller timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<tokio::sync::MutexGuard<'_, Rows>> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(WaitlistError::StoreUnavailable(
                "in-memory store is offline".to_string(),
            ));
        }
        Ok(self.rows.lock().await)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_by_creation<T>(mut rows: Vec<T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

#[async_trait]
impl WaitlistStore for InMemoryStore {
    async fn list_stores(&self) -> Result<Vec<Store>> {
        let rows = self.lock().await?;
        let stores = rows.stores.values().cloned().collect();
        Ok(sorted_by_creation(stores, |s| s.created_at))
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        let rows = self.lock().await?;
        Ok(rows.stores.get(&id).cloned())
    }

    async fn insert_store(&self, store: NewStore) -> Result<Store> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let store = Store {
            id: Uuid::new_v4(),
            name: store.name,
            location: store.location,
            rates: store.rates,
            created_at: now,
            updated_at: now,
        };
        rows.stores.insert(store.id, store.clone());
        self.feed.publish(Change::Stores(ChangeEvent::Insert {
            new: store.clone(),
        }));
        Ok(store)
    }

    async fn update_store_rates(&self, id: StoreId, rates: Vec<String>) -> Result<Store> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let store = rows
            .stores
            .get_mut(&id)
            .ok_or_else(|| WaitlistError::not_found("store", id))?;
        let old = store.clone();
        store.rates = rates;
        store.updated_at = now;
        let new = store.clone();
        self.feed.publish(Change::Stores(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn rename_rate(&self, store_id: StoreId, from: &str, to: &str) -> Result<Store> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let mut changes = Vec::new();

        let store = rows
            .stores
            .get_mut(&store_id)
            .ok_or_else(|| WaitlistError::not_found("store", store_id))?;
        let old_store = store.clone();
        for rate in store.rates.iter_mut().filter(|r| r.as_str() == from) {
            *rate = to.to_string();
        }
        store.updated_at = now;
        let new_store = store.clone();
        changes.push(Change::Stores(ChangeEvent::Update {
            old: old_store,
            new: new_store.clone(),
        }));

        for table in rows
            .tables
            .values_mut()
            .filter(|t| t.store_id == store_id && t.rate == from)
        {
            let old = table.clone();
            table.rate = to.to_string();
            table.updated_at = now;
            changes.push(Change::Tables(ChangeEvent::Update {
                old,
                new: table.clone(),
            }));
        }

        for entry in rows
            .waitlist
            .values_mut()
            .filter(|w| w.store_id == store_id && w.wants_rate(from))
        {
            let old = entry.clone();
            entry.rate = Some(to.to_string());
            entry.updated_at = now;
            changes.push(Change::Waitlist(ChangeEvent::Update {
                old,
                new: entry.clone(),
            }));
        }

        debug!(%store_id, from, to, rows = changes.len(), "renamed rate");
        for change in changes {
            self.feed.publish(change);
        }
        Ok(new_store)
    }

    async fn list_tables(&self, query: &TableQuery) -> Result<Vec<Table>> {
        let rows = self.lock().await?;
        let tables = rows
            .tables
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        Ok(sorted_by_creation(tables, |t| t.created_at))
    }

    async fn get_table(&self, id: TableId) -> Result<Option<Table>> {
        let rows = self.lock().await?;
        Ok(rows.tables.get(&id).cloned())
    }

    async fn insert_table(&self, table: NewTable) -> Result<Table> {
        let mut rows = self.lock().await?;
        if !rows.stores.contains_key(&table.store_id) {
            return Err(WaitlistError::not_found("store", table.store_id));
        }
        let now = self.clock.now();
        let table = Table {
            id: Uuid::new_v4(),
            store_id: table.store_id,
            rate: table.rate,
            max_seats: table.max_seats,
            current_players: 0,
            status: table.status,
            created_at: now,
            updated_at: now,
        };
        rows.tables.insert(table.id, table.clone());
        self.feed.publish(Change::Tables(ChangeEvent::Insert {
            new: table.clone(),
        }));
        Ok(table)
    }

    async fn update_table(&self, id: TableId, patch: TablePatch) -> Result<Table> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let table = rows
            .tables
            .get_mut(&id)
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        if let Some(max_seats) = patch.max_seats {
            if max_seats < table.current_players {
                return Err(WaitlistError::validation(format!(
                    "{} players are seated; cannot reduce the table to {max_seats} seats",
                    table.current_players
                )));
            }
        }
        let old = table.clone();
        if let Some(rate) = patch.rate {
            table.rate = rate;
        }
        if let Some(max_seats) = patch.max_seats {
            table.max_seats = max_seats;
        }
        if let Some(status) = patch.status {
            table.status = status;
        }
        table.updated_at = now;
        let new = table.clone();
        self.feed.publish(Change::Tables(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn delete_table(&self, id: TableId) -> Result<Table> {
        let mut rows = self.lock().await?;
        let table = rows
            .tables
            .get(&id)
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        if table.current_players > 0 {
            return Err(WaitlistError::Conflict(format!(
                "{} players are still seated at this table",
                table.current_players
            )));
        }
        let old = rows
            .tables
            .remove(&id)
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        self.feed.publish(Change::Tables(ChangeEvent::Delete { old: old.clone() }));
        Ok(old)
    }

    async fn adjust_players(&self, id: TableId, delta: i32) -> Result<Table> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let table = rows
            .tables
            .get_mut(&id)
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        let old = table.clone();
        table.current_players = table.clamped_players(delta);
        table.updated_at = now;
        let new = table.clone();
        self.feed.publish(Change::Tables(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn list_waitlist(&self, query: &WaitlistQuery) -> Result<Vec<WaitlistEntry>> {
        let rows = self.lock().await?;
        let entries = rows
            .waitlist
            .values()
            .filter(|w| query.matches(w))
            .cloned()
            .collect();
        Ok(sorted_by_creation(entries, |w| w.created_at))
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>> {
        let rows = self.lock().await?;
        Ok(rows.waitlist.get(&id).cloned())
    }

    async fn insert_entry(&self, entry: NewEntry) -> Result<WaitlistEntry> {
        let mut rows = self.lock().await?;
        if !rows.stores.contains_key(&entry.store_id) {
            return Err(WaitlistError::not_found("store", entry.store_id));
        }
        let now = self.clock.now();
        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            store_id: entry.store_id,
            player_id: entry.player_id,
            player_name: entry.player_name,
            rate: entry.rate,
            status: WaitlistStatus::Waiting,
            called_at: None,
            arrival_estimate_minutes: entry.arrival_estimate_minutes,
            created_at: now,
            updated_at: now,
        };
        rows.waitlist.insert(entry.id, entry.clone());
        self.feed.publish(Change::Waitlist(ChangeEvent::Insert {
            new: entry.clone(),
        }));
        Ok(entry)
    }

    async fn transition_entry(
        &self,
        id: EntryId,
        expected: &[WaitlistStatus],
        to: WaitlistStatus,
        called_at: Option<DateTime<Utc>>,
    ) -> Result<Option<WaitlistEntry>> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();
        let Some(entry) = rows.waitlist.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&entry.status) {
            return Ok(None);
        }
        let old = entry.clone();
        entry.status = to;
        if called_at.is_some() {
            entry.called_at = called_at;
        }
        entry.updated_at = now;
        let new = entry.clone();
        self.feed.publish(Change::Waitlist(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(Some(new))
    }

    async fn seat_entry(
        &self,
        entry_id: EntryId,
        table_id: TableId,
    ) -> Result<(WaitlistEntry, Table)> {
        let mut rows = self.lock().await?;
        let now = self.clock.now();

        let entry = rows
            .waitlist
            .get(&entry_id)
            .ok_or_else(|| WaitlistError::not_found("waitlist entry", entry_id))?;
        if entry.status.is_terminal() {
            return Err(WaitlistError::InvalidTransition {
                action: "seat",
                from: entry.status,
            });
        }
        let table = rows
            .tables
            .get(&table_id)
            .ok_or_else(|| WaitlistError::not_found("table", table_id))?;
        if table.store_id != entry.store_id
            || entry.rate.as_deref() != Some(table.rate.as_str())
            || !table.is_open()
        {
            return Err(WaitlistError::validation(
                "table is not an open table at the entry's store and rate",
            ));
        }
        if table.is_full() {
            return Err(WaitlistError::Capacity(table_id));
        }

        // Both rows were checked under the lock; apply together.
        let (old_table, new_table) = {
            let table = rows
                .tables
                .get_mut(&table_id)
                .ok_or_else(|| WaitlistError::not_found("table", table_id))?;
            let old = table.clone();
            table.current_players += 1;
            table.updated_at = now;
            (old, table.clone())
        };
        let (old_entry, new_entry) = {
            let entry = rows
                .waitlist
                .get_mut(&entry_id)
                .ok_or_else(|| WaitlistError::not_found("waitlist entry", entry_id))?;
            let old = entry.clone();
            entry.status = WaitlistStatus::Seated;
            entry.updated_at = now;
            (old, entry.clone())
        };

        self.feed.publish(Change::Tables(ChangeEvent::Update {
            old: old_table,
            new: new_table.clone(),
        }));
        self.feed.publish(Change::Waitlist(ChangeEvent::Update {
            old: old_entry,
            new: new_entry.clone(),
        }));
        Ok((new_entry, new_table))
    }

    fn subscribe(&self, filter: FeedFilter) -> Subscription {
        self.feed.subscribe(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Collection, FeedMessage};
    use crate::model::{Coordinate, TableStatus};

    async fn seeded() -> (InMemoryStore, Store, Table) {
        let store = InMemoryStore::new();
        let room = store
            .insert_store(NewStore {
                name: "CTP Taipei".to_string(),
                location: Coordinate {
                    lat: 25.04,
                    lng: 121.56,
                },
                rates: vec!["1/3".to_string(), "2/5".to_string()],
            })
            .await
            .unwrap();
        let table = store
            .insert_table(NewTable {
                store_id: room.id,
                rate: "1/3".to_string(),
                max_seats: 2,
                status: TableStatus::Open,
            })
            .await
            .unwrap();
        (store, room, table)
    }

    async fn check_in(store: &InMemoryStore, room: &Store, player: &str) -> WaitlistEntry {
        store
            .insert_entry(NewEntry {
                store_id: room.id,
                player_id: player.to_string(),
                player_name: player.to_uppercase(),
                rate: Some("1/3".to_string()),
                arrival_estimate_minutes: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn seating_stops_at_capacity() {
        let (store, room, table) = seeded().await;
        for player in ["a", "b"] {
            let entry = check_in(&store, &room, player).await;
            store.seat_entry(entry.id, table.id).await.unwrap();
        }
        let late = check_in(&store, &room, "c").await;
        let err = store.seat_entry(late.id, table.id).await.unwrap_err();
        assert!(matches!(err, WaitlistError::Capacity(id) if id == table.id));

        let late = store.get_entry(late.id).await.unwrap().unwrap();
        assert_eq!(late.status, WaitlistStatus::Waiting);
        let table = store.get_table(table.id).await.unwrap().unwrap();
        assert_eq!(table.current_players, 2);
    }

    #[tokio::test]
    async fn transition_requires_expected_status() {
        let (store, room, _) = seeded().await;
        let entry = check_in(&store, &room, "a").await;
        let called = store
            .transition_entry(
                entry.id,
                &[WaitlistStatus::Waiting],
                WaitlistStatus::Called,
                Some(Utc::now()),
            )
            .await
            .unwrap()
            .unwrap();
        assert!(called.called_at.is_some());

        let again = store
            .transition_entry(entry.id, &[WaitlistStatus::Waiting], WaitlistStatus::Called, None)
            .await
            .unwrap();
        assert_eq!(again, None);
    }

    #[tokio::test]
    async fn occupied_table_cannot_be_deleted_or_shrunk() {
        let (store, room, table) = seeded().await;
        let entry = check_in(&store, &room, "a").await;
        store.seat_entry(entry.id, table.id).await.unwrap();
        store.adjust_players(table.id, 1).await.unwrap();

        assert!(matches!(
            store.delete_table(table.id).await,
            Err(WaitlistError::Conflict(_))
        ));
        let patch = TablePatch {
            max_seats: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            store.update_table(table.id, patch).await,
            Err(WaitlistError::Validation(_))
        ));

        store.adjust_players(table.id, -5).await.unwrap();
        store.delete_table(table.id).await.unwrap();
        assert_eq!(store.get_table(table.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rename_cascades_to_tables_and_waitlist() {
        let (store, room, table) = seeded().await;
        let entry = check_in(&store, &room, "a").await;
        let renamed = store.rename_rate(room.id, "1/3", "1/2").await.unwrap();

        assert_eq!(renamed.rates, vec!["1/2".to_string(), "2/5".to_string()]);
        let table = store.get_table(table.id).await.unwrap().unwrap();
        assert_eq!(table.rate, "1/2");
        let entry = store.get_entry(entry.id).await.unwrap().unwrap();
        assert_eq!(entry.rate.as_deref(), Some("1/2"));
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let (store, room, _) = seeded().await;
        store.set_available(false);
        assert!(matches!(
            store.list_stores().await,
            Err(WaitlistError::StoreUnavailable(_))
        ));
        store.set_available(true);
        assert_eq!(store.get_store(room.id).await.unwrap().unwrap().id, room.id);
    }

    #[tokio::test]
    async fn writes_are_published_to_subscribers() {
        let (store, room, table) = seeded().await;
        let mut tables = store.subscribe(FeedFilter::store(Collection::Tables, room.id));
        store.adjust_players(table.id, 1).await.unwrap();

        match tables.try_recv() {
            Some(FeedMessage::Change(Change::Tables(ChangeEvent::Update { old, new }))) => {
                assert_eq!(old.current_players, 0);
                assert_eq!(new.current_players, 1);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test]
    async fn queries_come_back_in_creation_order() {
        let (store, room, _) = seeded().await;
        let first = check_in(&store, &room, "a").await;
        let second = check_in(&store, &room, "b").await;
        let third = check_in(&store, &room, "c").await;

        let ids: Vec<_> = store
            .list_waitlist(&WaitlistQuery::for_store(room.id).rate("1/3"))
            .await
            .unwrap()
            .into_iter()
            .map(|w| w.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);

        let before = store
            .list_waitlist(&WaitlistQuery::for_store(room.id).created_before(third.created_at))
            .await
            .unwrap();
        assert_eq!(before.len(), 2);
    }
}
