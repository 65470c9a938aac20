//! Staff dashboard for one store and buy-in tier.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::{ADMIN_VISIBLE, EntryFilter, ProjectionSet, TableFilter};
use crate::context::{Message, SessionContext};
use crate::engine::{ScanOutcome, WaitlistEngine};
use crate::error::{Result, WaitlistError};
use crate::feed::{Change, Collection, FeedFilter, FeedMessage, Subscription};
use crate::model::{
    EntryId, SignalStatus, StoreId, Table, TableId, WaitlistEntry, WaitlistStatus,
};
use crate::occupancy::{self, QueueScope};
use crate::store::{TableQuery, WaitlistQuery};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueRow {
    #[serde(flatten)]
    pub entry: WaitlistEntry,
    pub position: usize,
    pub minutes_since_called: Option<i64>,
    /// Called and still not here after the overdue window.
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub store_id: StoreId,
    pub rate: String,
    pub tables: Vec<Table>,
    pub queue: Vec<QueueRow>,
    pub available_seats: u32,
    pub total_seats: u32,
    pub waiting: usize,
    pub signal: SignalStatus,
}

pub struct AdminDashboard {
    engine: WaitlistEngine,
    store_id: StoreId,
    rate: String,
    tables: ProjectionSet<Table, TableFilter>,
    queue: ProjectionSet<WaitlistEntry, EntryFilter>,
    table_feed: Subscription,
    queue_feed: Subscription,
}

impl AdminDashboard {
    pub async fn open(
        engine: WaitlistEngine,
        store_id: StoreId,
        rate: impl Into<String>,
    ) -> Result<Self> {
        let rate = rate.into();
        let store = engine.store_by_id(store_id).await?;
        if !store.offers_rate(&rate) {
            return Err(WaitlistError::validation(format!(
                "{} does not run a {rate} game",
                store.name
            )));
        }

        // Subscribe before the bulk read so no write in between is lost.
        let table_feed = engine.subscribe(FeedFilter::store(Collection::Tables, store_id));
        let queue_feed = engine.subscribe(FeedFilter::store(Collection::Waitlist, store_id));
        let mut dashboard = Self {
            tables: ProjectionSet::new(TableFilter::scoped(store_id, rate.as_str())),
            queue: ProjectionSet::new(EntryFilter::scoped(
                store_id,
                rate.as_str(),
                ADMIN_VISIBLE,
            )),
            engine,
            store_id,
            rate,
            table_feed,
            queue_feed,
        };
        dashboard.reload().await?;
        Ok(dashboard)
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn rate(&self) -> &str {
        &self.rate
    }

    pub fn tables(&self) -> &[Table] {
        self.tables.rows()
    }

    pub fn queue(&self) -> &[WaitlistEntry] {
        self.queue.rows()
    }

    pub async fn reload(&mut self) -> Result<()> {
        let tables = self
            .engine
            .tables(&TableQuery::for_store(self.store_id).rate(self.rate.as_str()))
            .await?;
        let entries = self
            .engine
            .waitlist(
                &WaitlistQuery::for_store(self.store_id)
                    .rate(self.rate.as_str())
                    .statuses(ADMIN_VISIBLE),
            )
            .await?;
        self.tables.seed(tables);
        self.queue.seed(entries);
        debug!(
            store_id = %self.store_id,
            rate = %self.rate,
            tables = self.tables.len(),
            queue = self.queue.len(),
            "dashboard loaded"
        );
        Ok(())
    }

    /// Folds every event delivered so far and returns how many were applied.
    /// Reloads from the store if either feed fell behind.
    pub async fn sync(&mut self, ctx: &mut SessionContext) -> Result<usize> {
        let mut applied = 0;
        let mut stale = false;

        while let Some(message) = self.table_feed.try_recv() {
            match message {
                FeedMessage::Change(Change::Tables(event)) => {
                    self.tables.apply(&event);
                    applied += 1;
                }
                FeedMessage::Change(_) => {}
                FeedMessage::Resync { missed } => {
                    warn!(missed, "dashboard table feed lagged");
                    stale = true;
                }
            }
        }
        while let Some(message) = self.queue_feed.try_recv() {
            match message {
                FeedMessage::Change(Change::Waitlist(event)) => {
                    self.queue.apply(&event);
                    applied += 1;
                }
                FeedMessage::Change(_) => {}
                FeedMessage::Resync { missed } => {
                    warn!(missed, "dashboard waitlist feed lagged");
                    stale = true;
                }
            }
        }

        if stale {
            self.reload().await?;
            ctx.info(Message::ViewReloaded);
        }
        Ok(applied)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        let tables = self.tables.rows();
        let entries = self.queue.rows();
        let queue = entries
            .iter()
            .map(|entry| QueueRow {
                entry: entry.clone(),
                position: occupancy::queue_position(entry, entries, QueueScope::Active),
                minutes_since_called: occupancy::minutes_since_called(entry, now),
                overdue: occupancy::is_call_overdue(entry, now),
            })
            .collect();

        DashboardSnapshot {
            store_id: self.store_id,
            rate: self.rate.clone(),
            tables: tables.to_vec(),
            queue,
            available_seats: occupancy::available_seats(tables),
            total_seats: occupancy::total_seats(tables),
            waiting: occupancy::waiting_count(entries),
            signal: occupancy::signal_status(tables, entries),
        }
    }

    /// Entries called long enough ago to need attention.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&WaitlistEntry> {
        self.queue
            .rows()
            .iter()
            .filter(|entry| occupancy::is_call_overdue(entry, now))
            .collect()
    }

    /// Shows the player as called right away; reverts if the store refuses.
    pub async fn call_player(
        &mut self,
        entry_id: EntryId,
        ctx: &mut SessionContext,
    ) -> Result<WaitlistEntry> {
        let optimistic = self
            .queue
            .get(entry_id)
            .filter(|entry| entry.status == WaitlistStatus::Waiting)
            .map(|entry| WaitlistEntry {
                status: WaitlistStatus::Called,
                called_at: Some(Utc::now()),
                ..entry.clone()
            });
        let previous = optimistic.map(|row| self.queue.apply_optimistic(row));

        match self.engine.call(entry_id).await {
            Ok(entry) => {
                self.queue.confirm(entry.clone());
                ctx.success(Message::PlayerCalled);
                Ok(entry)
            }
            Err(err) => {
                if let Some(previous) = previous {
                    self.queue.restore(entry_id, previous);
                }
                ctx.error(&err);
                Err(err)
            }
        }
    }

    /// Moves the seat count right away; reverts if the store refuses.
    pub async fn adjust_seats(
        &mut self,
        table_id: TableId,
        delta: i32,
        ctx: &mut SessionContext,
    ) -> Result<Table> {
        let optimistic = self.tables.get(table_id).map(|table| Table {
            current_players: table.clamped_players(delta),
            ..table.clone()
        });
        let previous = optimistic.map(|row| self.tables.apply_optimistic(row));

        match self.engine.adjust_seats(table_id, delta).await {
            Ok(table) => {
                self.tables.confirm(table.clone());
                ctx.success(Message::SeatsUpdated);
                Ok(table)
            }
            Err(err) => {
                if let Some(previous) = previous {
                    self.tables.restore(table_id, previous);
                }
                ctx.error(&err);
                Err(err)
            }
        }
    }

    pub async fn mark_arrived(
        &mut self,
        entry_id: EntryId,
        ctx: &mut SessionContext,
    ) -> Result<WaitlistEntry> {
        let result = self.engine.arrive(entry_id).await;
        self.confirm_entry(result, Message::PlayerArrived, ctx)
    }

    pub async fn seat(
        &mut self,
        entry_id: EntryId,
        table_id: TableId,
        ctx: &mut SessionContext,
    ) -> Result<(WaitlistEntry, Table)> {
        let result = self.engine.seat(entry_id, table_id).await;
        self.confirm_seat(result, ctx)
    }

    pub async fn seat_anywhere(
        &mut self,
        entry_id: EntryId,
        ctx: &mut SessionContext,
    ) -> Result<(WaitlistEntry, Table)> {
        let result = self.engine.seat_anywhere(entry_id).await;
        self.confirm_seat(result, ctx)
    }

    pub async fn cancel(
        &mut self,
        entry_id: EntryId,
        ctx: &mut SessionContext,
    ) -> Result<WaitlistEntry> {
        let result = self.engine.cancel(entry_id).await;
        self.confirm_entry(result, Message::EntryCancelled, ctx)
    }

    pub async fn add_walk_in(
        &mut self,
        name: &str,
        ctx: &mut SessionContext,
    ) -> Result<WaitlistEntry> {
        let result = self.engine.add_walk_in(self.store_id, &self.rate, name).await;
        self.confirm_entry(result, Message::CheckedIn, ctx)
    }

    pub async fn scan(&mut self, uri: &str, ctx: &mut SessionContext) -> Result<ScanOutcome> {
        match self.engine.scan_player(self.store_id, &self.rate, uri).await {
            Ok(outcome) => {
                self.queue.confirm(outcome.entry().clone());
                ctx.success(match outcome {
                    ScanOutcome::Arrived(_) => Message::PlayerArrived,
                    ScanOutcome::CheckedIn(_) => Message::CheckedIn,
                });
                Ok(outcome)
            }
            Err(err) => {
                ctx.error(&err);
                Err(err)
            }
        }
    }

    fn confirm_entry(
        &mut self,
        result: Result<WaitlistEntry>,
        message: Message,
        ctx: &mut SessionContext,
    ) -> Result<WaitlistEntry> {
        match result {
            Ok(entry) => {
                self.queue.confirm(entry.clone());
                ctx.success(message);
                Ok(entry)
            }
            Err(err) => {
                ctx.error(&err);
                Err(err)
            }
        }
    }

    fn confirm_seat(
        &mut self,
        result: Result<(WaitlistEntry, Table)>,
        ctx: &mut SessionContext,
    ) -> Result<(WaitlistEntry, Table)> {
        match result {
            Ok((entry, table)) => {
                self.queue.confirm(entry.clone());
                self.tables.confirm(table.clone());
                ctx.success(Message::PlayerSeated);
                Ok((entry, table))
            }
            Err(err) => {
                ctx.error(&err);
                Err(err)
            }
        }
    }
}
