//! Waitlist transitions and room administration on top of a [`WaitlistStore`].
//!
//! Input is validated here before any store call. Store failures come back to
//! the caller unchanged in kind; nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, WaitlistError};
use crate::feed::{FeedFilter, Subscription};
use crate::identity::{PlayerIdentity, player_id_checked};
use crate::model::{
    Coordinate, EntryId, Store, StoreId, Table, TableId, TableStatus, WaitlistEntry,
    WaitlistStatus,
};
use crate::occupancy::{self, QueueScope, StoreSignal};
use crate::store::{
    NewEntry, NewStore, NewTable, TablePatch, TableQuery, WaitlistQuery, WaitlistStore,
};
use crate::validation::{self, NameSurface};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

const WALK_IN_PREFIX: &str = "manual-";

/// A player asking to join the line.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckIn {
    pub store_id: StoreId,
    pub rate: String,
    pub player_id: String,
    pub player_name: String,
    #[serde(default)]
    pub arrival_estimate_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The player already had a place in line and is now marked as arrived.
    Arrived(WaitlistEntry),
    /// The player had no place in line and was checked in at the selected rate.
    CheckedIn(WaitlistEntry),
}

impl ScanOutcome {
    pub fn entry(&self) -> &WaitlistEntry {
        match self {
            ScanOutcome::Arrived(entry) | ScanOutcome::CheckedIn(entry) => entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateStats {
    pub rate: String,
    pub tables: usize,
    pub active_entries: usize,
}

/// What a player sees about their own entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub entry: WaitlistEntry,
    pub store_name: String,
    /// Only present while the entry is still waiting.
    pub position: Option<usize>,
    /// Advisory only.
    pub estimated_call_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct WaitlistEngine {
    store: Arc<dyn WaitlistStore>,
    timeout: Duration,
}

impl WaitlistEngine {
    pub fn new(store: Arc<dyn WaitlistStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn subscribe(&self, filter: FeedFilter) -> Subscription {
        self.store.subscribe(filter)
    }

    /// Runs one store call under the configured timeout.
    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.timeout, "store call timed out");
                Err(WaitlistError::StoreUnavailable(format!(
                    "{op} did not complete within {:?}",
                    self.timeout
                )))
            }
        }
    }

    // ---- reads ----

    pub async fn stores(&self) -> Result<Vec<Store>> {
        self.bounded("list stores", self.store.list_stores()).await
    }

    pub async fn store_by_id(&self, store_id: StoreId) -> Result<Store> {
        self.bounded("get store", self.store.get_store(store_id))
            .await?
            .ok_or_else(|| WaitlistError::not_found("store", store_id))
    }

    pub async fn tables(&self, query: &TableQuery) -> Result<Vec<Table>> {
        self.bounded("list tables", self.store.list_tables(query)).await
    }

    pub async fn table_by_id(&self, table_id: TableId) -> Result<Table> {
        self.bounded("get table", self.store.get_table(table_id))
            .await?
            .ok_or_else(|| WaitlistError::not_found("table", table_id))
    }

    pub async fn waitlist(&self, query: &WaitlistQuery) -> Result<Vec<WaitlistEntry>> {
        self.bounded("list waitlist", self.store.list_waitlist(query)).await
    }

    pub async fn entry_by_id(&self, entry_id: EntryId) -> Result<WaitlistEntry> {
        self.bounded("get entry", self.store.get_entry(entry_id))
            .await?
            .ok_or_else(|| WaitlistError::not_found("waitlist entry", entry_id))
    }

    async fn store_offering(&self, store_id: StoreId, rate: &str) -> Result<Store> {
        let store = self.store_by_id(store_id).await?;
        if !store.offers_rate(rate) {
            return Err(WaitlistError::validation(format!(
                "{} does not run a {rate} game",
                store.name
            )));
        }
        Ok(store)
    }

    // ---- player transitions ----

    /// Puts a player in line. No seat is reserved.
    pub async fn check_in(&self, request: CheckIn) -> Result<WaitlistEntry> {
        self.enqueue(request, NameSurface::Player).await
    }

    async fn enqueue(&self, request: CheckIn, surface: NameSurface) -> Result<WaitlistEntry> {
        player_id_checked(&request.player_id)?;
        let player_name = validation::player_name(&request.player_name, surface)?;
        let arrival_estimate_minutes =
            validation::arrival_estimate(request.arrival_estimate_minutes)?;
        self.store_offering(request.store_id, &request.rate).await?;

        let entry = self
            .bounded(
                "insert entry",
                self.store.insert_entry(NewEntry {
                    store_id: request.store_id,
                    player_id: request.player_id,
                    player_name,
                    rate: Some(request.rate),
                    arrival_estimate_minutes,
                }),
            )
            .await?;
        info!(
            entry_id = %entry.id,
            store_id = %entry.store_id,
            rate = ?entry.rate,
            "player checked in"
        );
        Ok(entry)
    }

    /// Applies a guarded status change, explaining a failed precondition.
    async fn transition(
        &self,
        action: &'static str,
        entry_id: EntryId,
        expected: &[WaitlistStatus],
        to: WaitlistStatus,
        called_at: Option<DateTime<Utc>>,
    ) -> Result<WaitlistEntry> {
        let moved = self
            .bounded(
                "transition entry",
                self.store.transition_entry(entry_id, expected, to, called_at),
            )
            .await?;
        match moved {
            Some(entry) => Ok(entry),
            None => {
                let current = self.entry_by_id(entry_id).await?;
                debug!(%entry_id, action, from = %current.status, "transition refused");
                Err(WaitlistError::InvalidTransition {
                    action,
                    from: current.status,
                })
            }
        }
    }

    pub async fn call(&self, entry_id: EntryId) -> Result<WaitlistEntry> {
        let entry = self
            .transition(
                "call",
                entry_id,
                &[WaitlistStatus::Waiting],
                WaitlistStatus::Called,
                Some(Utc::now()),
            )
            .await?;
        info!(%entry_id, store_id = %entry.store_id, "player called");
        Ok(entry)
    }

    /// Marks this entry as arrived at the front desk.
    pub async fn arrive(&self, entry_id: EntryId) -> Result<WaitlistEntry> {
        let entry = self
            .transition(
                "mark arrived",
                entry_id,
                &[WaitlistStatus::Waiting, WaitlistStatus::Called],
                WaitlistStatus::Arrived,
                None,
            )
            .await?;
        info!(%entry_id, store_id = %entry.store_id, "player arrived");
        Ok(entry)
    }

    /// Marks the player's oldest waiting or called entry at the store as arrived.
    pub async fn mark_arrived(
        &self,
        store_id: StoreId,
        player_id: &str,
    ) -> Result<WaitlistEntry> {
        let query = WaitlistQuery::for_store(store_id)
            .player(player_id)
            .statuses(&[WaitlistStatus::Waiting, WaitlistStatus::Called]);
        let entry = self
            .waitlist(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WaitlistError::not_found("waitlist entry for player", player_id))?;

        self.arrive(entry.id).await
    }

    /// Seats the entry at the table and takes one seat, both or neither.
    pub async fn seat(
        &self,
        entry_id: EntryId,
        table_id: TableId,
    ) -> Result<(WaitlistEntry, Table)> {
        let result = self
            .bounded("seat entry", self.store.seat_entry(entry_id, table_id))
            .await;
        match &result {
            Ok((_, table)) => info!(
                %entry_id, %table_id,
                players = table.current_players,
                max_seats = table.max_seats,
                "player seated"
            ),
            Err(WaitlistError::Capacity(_)) => {
                info!(%entry_id, %table_id, "table full at seat time")
            }
            Err(err) => debug!(%entry_id, %table_id, error = %err, "seat refused"),
        }
        result
    }

    /// Seats the entry at the first open table of its store and rate that has room.
    pub async fn seat_anywhere(&self, entry_id: EntryId) -> Result<(WaitlistEntry, Table)> {
        let entry = self.entry_by_id(entry_id).await?;
        let rate = entry
            .rate
            .clone()
            .ok_or_else(|| WaitlistError::validation("entry has no rate to seat at"))?;
        let tables = self
            .tables(
                &TableQuery::for_store(entry.store_id)
                    .rate(rate.as_str())
                    .status(TableStatus::Open),
            )
            .await?;

        for table in tables.iter().filter(|t| !t.is_full()) {
            match self.seat(entry_id, table.id).await {
                Err(WaitlistError::Capacity(_)) => continue,
                other => return other,
            }
        }
        Err(WaitlistError::Conflict(format!(
            "no open {rate} table has a free seat"
        )))
    }

    /// A retry against an already cancelled entry is refused, not ignored.
    pub async fn cancel(&self, entry_id: EntryId) -> Result<WaitlistEntry> {
        let entry = self
            .transition(
                "cancel",
                entry_id,
                &WaitlistStatus::NON_TERMINAL,
                WaitlistStatus::Cancelled,
                None,
            )
            .await?;
        info!(%entry_id, store_id = %entry.store_id, "entry cancelled");
        Ok(entry)
    }

    /// Player-initiated cancel. Someone else's entry is reported as missing.
    pub async fn cancel_own(&self, entry_id: EntryId, player_id: &str) -> Result<WaitlistEntry> {
        let entry = self.entry_by_id(entry_id).await?;
        if entry.player_id != player_id {
            return Err(WaitlistError::not_found("waitlist entry", entry_id));
        }
        self.cancel(entry_id).await
    }

    pub async fn adjust_seats(&self, table_id: TableId, delta: i32) -> Result<Table> {
        let table = self
            .bounded("adjust players", self.store.adjust_players(table_id, delta))
            .await?;
        info!(%table_id, delta, players = table.current_players, "seats adjusted");
        Ok(table)
    }

    // ---- staff surfaces ----

    /// Adds a player who has no phone. Gets a synthetic `manual-` player id.
    pub async fn add_walk_in(
        &self,
        store_id: StoreId,
        rate: &str,
        name: &str,
    ) -> Result<WaitlistEntry> {
        let request = CheckIn {
            store_id,
            rate: rate.to_string(),
            player_id: format!("{WALK_IN_PREFIX}{}", Uuid::new_v4().simple()),
            player_name: name.to_string(),
            arrival_estimate_minutes: None,
        };
        self.enqueue(request, NameSurface::Admin).await
    }

    /// Handles a scanned player QR code at the front desk.
    pub async fn scan_player(
        &self,
        store_id: StoreId,
        rate: &str,
        uri: &str,
    ) -> Result<ScanOutcome> {
        let identity = PlayerIdentity::parse_uri(uri)?;
        let existing = self
            .waitlist(
                &WaitlistQuery::for_store(store_id)
                    .player(identity.player_id.as_str())
                    .statuses(&WaitlistStatus::NON_TERMINAL),
            )
            .await?;
        if existing.iter().any(|e| e.status != WaitlistStatus::Arrived) {
            return self
                .mark_arrived(store_id, &identity.player_id)
                .await
                .map(ScanOutcome::Arrived);
        }
        if let Some(here) = existing.into_iter().next() {
            debug!(entry_id = %here.id, "scanned player is already here");
            return Ok(ScanOutcome::Arrived(here));
        }

        let name = identity
            .display_name
            .ok_or_else(|| WaitlistError::validation("QR code carries no player name"))?;
        let request = CheckIn {
            store_id,
            rate: rate.to_string(),
            player_id: identity.player_id,
            player_name: name,
            arrival_estimate_minutes: None,
        };
        self.enqueue(request, NameSurface::Admin)
            .await
            .map(ScanOutcome::CheckedIn)
    }

    pub async fn register_store(
        &self,
        name: &str,
        location: Coordinate,
        rates: &[String],
    ) -> Result<Store> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WaitlistError::validation("store name is required"));
        }
        let mut labels: Vec<String> = Vec::with_capacity(rates.len());
        for rate in rates {
            let label = validation::rate_label(rate)?;
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        let store = self
            .bounded(
                "insert store",
                self.store.insert_store(NewStore {
                    name: name.to_string(),
                    location,
                    rates: labels,
                }),
            )
            .await?;
        info!(store_id = %store.id, name = %store.name, "store registered");
        Ok(store)
    }

    pub async fn add_table(
        &self,
        store_id: StoreId,
        rate: &str,
        max_seats: u32,
        status: TableStatus,
    ) -> Result<Table> {
        let max_seats = validation::max_seats(max_seats)?;
        self.store_offering(store_id, rate).await?;
        let table = self
            .bounded(
                "insert table",
                self.store.insert_table(NewTable {
                    store_id,
                    rate: rate.to_string(),
                    max_seats,
                    status,
                }),
            )
            .await?;
        info!(table_id = %table.id, %store_id, rate, max_seats, "table added");
        Ok(table)
    }

    pub async fn edit_table(&self, table_id: TableId, patch: TablePatch) -> Result<Table> {
        if let Some(max_seats) = patch.max_seats {
            validation::max_seats(max_seats)?;
        }
        if let Some(rate) = &patch.rate {
            let table = self.table_by_id(table_id).await?;
            self.store_offering(table.store_id, rate).await?;
        }
        let table = self
            .bounded("update table", self.store.update_table(table_id, patch))
            .await?;
        info!(%table_id, "table edited");
        Ok(table)
    }

    pub async fn delete_table(&self, table_id: TableId) -> Result<Table> {
        let table = self
            .bounded("delete table", self.store.delete_table(table_id))
            .await?;
        info!(%table_id, store_id = %table.store_id, "table deleted");
        Ok(table)
    }

    // ---- buy-in tiers ----

    /// Adds a buy-in tier from a typed amount, e.g. `"3400"` becomes `"NT$3,400"`.
    pub async fn add_rate(&self, store_id: StoreId, amount: &str) -> Result<Store> {
        let label = validation::buy_in_label(amount)?;
        let store = self.store_by_id(store_id).await?;
        if store.offers_rate(&label) {
            return Err(WaitlistError::validation(format!("{label} already exists")));
        }
        let mut rates = store.rates;
        rates.push(label.clone());
        let store = self
            .bounded("update rates", self.store.update_store_rates(store_id, rates))
            .await?;
        info!(%store_id, rate = %label, "rate added");
        Ok(store)
    }

    /// Relabels a tier everywhere it is used.
    pub async fn rename_rate(&self, store_id: StoreId, from: &str, to: &str) -> Result<Store> {
        let to = validation::rate_label(to)?;
        let store = self.store_by_id(store_id).await?;
        if !store.offers_rate(from) {
            return Err(WaitlistError::not_found("rate", from));
        }
        if from == to {
            return Ok(store);
        }
        if store.offers_rate(&to) {
            return Err(WaitlistError::validation(format!("{to} already exists")));
        }
        let store = self
            .bounded("rename rate", self.store.rename_rate(store_id, from, &to))
            .await?;
        info!(%store_id, from, to = %to, "rate renamed");
        Ok(store)
    }

    /// Refused while any table or non-terminal entry still uses the tier.
    pub async fn delete_rate(&self, store_id: StoreId, rate: &str) -> Result<Store> {
        let store = self.store_by_id(store_id).await?;
        if !store.offers_rate(rate) {
            return Err(WaitlistError::not_found("rate", rate));
        }
        let stats = self.stats_for(store_id, rate).await?;
        if stats.tables > 0 || stats.active_entries > 0 {
            return Err(WaitlistError::Conflict(format!(
                "{rate} is used by {} tables and {} players in line",
                stats.tables, stats.active_entries
            )));
        }
        let rates = store.rates.into_iter().filter(|r| r != rate).collect();
        let store = self
            .bounded("update rates", self.store.update_store_rates(store_id, rates))
            .await?;
        info!(%store_id, rate, "rate deleted");
        Ok(store)
    }

    async fn stats_for(&self, store_id: StoreId, rate: &str) -> Result<RateStats> {
        let tables = self.tables(&TableQuery::for_store(store_id).rate(rate)).await?;
        let entries = self
            .waitlist(
                &WaitlistQuery::for_store(store_id)
                    .rate(rate)
                    .statuses(&WaitlistStatus::NON_TERMINAL),
            )
            .await?;
        Ok(RateStats {
            rate: rate.to_string(),
            tables: tables.len(),
            active_entries: entries.len(),
        })
    }

    pub async fn rate_stats(&self, store_id: StoreId) -> Result<Vec<RateStats>> {
        let store = self.store_by_id(store_id).await?;
        let tables = self.tables(&TableQuery::for_store(store_id)).await?;
        let entries = self
            .waitlist(
                &WaitlistQuery::for_store(store_id).statuses(&WaitlistStatus::NON_TERMINAL),
            )
            .await?;
        Ok(store
            .rates
            .iter()
            .map(|rate| RateStats {
                rate: rate.clone(),
                tables: tables.iter().filter(|t| &t.rate == rate).count(),
                active_entries: entries.iter().filter(|w| w.wants_rate(rate)).count(),
            })
            .collect())
    }

    // ---- summaries ----

    pub async fn player_status(&self, entry_id: EntryId) -> Result<PlayerStatus> {
        let entry = self.entry_by_id(entry_id).await?;
        let store = self.store_by_id(entry.store_id).await?;

        let (position, estimated_call_at) = match (&entry.status, &entry.rate) {
            (WaitlistStatus::Waiting, Some(rate)) => {
                let line = self
                    .waitlist(
                        &WaitlistQuery::for_store(entry.store_id)
                            .rate(rate.as_str())
                            .statuses(&[WaitlistStatus::Waiting]),
                    )
                    .await?;
                let position = occupancy::queue_position(&entry, &line, QueueScope::WaitingOnly);
                (
                    Some(position),
                    Some(occupancy::estimate_call_time(&entry, position)),
                )
            }
            _ => (None, None),
        };

        Ok(PlayerStatus {
            entry,
            store_name: store.name,
            position,
            estimated_call_at,
        })
    }

    pub async fn store_signals(&self) -> Result<Vec<StoreSignal>> {
        let stores = self.stores().await?;
        let tables = self.tables(&TableQuery::default()).await?;
        let waiting = self
            .waitlist(&WaitlistQuery::default().statuses(&[WaitlistStatus::Waiting]))
            .await?;
        Ok(occupancy::store_signals(&stores, &tables, &waiting))
    }

    /// Called players who have not shown up within the overdue window.
    pub async fn overdue_calls(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>> {
        let called = self
            .waitlist(&WaitlistQuery::default().statuses(&[WaitlistStatus::Called]))
            .await?;
        Ok(called
            .into_iter()
            .filter(|entry| occupancy::is_call_overdue(entry, now))
            .collect())
    }
}
