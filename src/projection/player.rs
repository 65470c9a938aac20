//! Player-facing views: the store map, one store's line, and the player's own entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::{AllStores, EntryFilter, PLAYER_VISIBLE, ProjectionSet, TableFilter};
use crate::context::{Message, SessionContext};
use crate::engine::WaitlistEngine;
use crate::error::{Result, WaitlistError};
use crate::feed::{Change, Collection, FeedFilter, FeedMessage, Subscription};
use crate::model::{
    EntryId, SignalStatus, Store, StoreId, Table, WaitlistEntry, WaitlistStatus,
};
use crate::occupancy::{self, QueueScope, StoreSignal};
use crate::store::{TableQuery, WaitlistQuery};

/// Drains a subscription, handing changes to `apply`. Returns `(applied, lagged)`.
fn drain(feed: &mut Subscription, mut apply: impl FnMut(Change)) -> (usize, bool) {
    let mut applied = 0;
    let mut lagged = false;
    while let Some(message) = feed.try_recv() {
        match message {
            FeedMessage::Change(change) => {
                apply(change);
                applied += 1;
            }
            FeedMessage::Resync { missed } => {
                warn!(missed, filter = ?feed.filter(), "player feed lagged");
                lagged = true;
            }
        }
    }
    (applied, lagged)
}

/// A waiting player as other players see them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineRow {
    pub position: usize,
    pub player_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub store_id: StoreId,
    pub store_name: String,
    pub rate: String,
    pub signal: SignalStatus,
    pub available_seats: u32,
    pub total_seats: u32,
    pub line: Vec<LineRow>,
}

/// One store's tables and waiting line at a buy-in tier.
pub struct StoreView {
    engine: WaitlistEngine,
    store: Store,
    rate: String,
    tables: ProjectionSet<Table, TableFilter>,
    line: ProjectionSet<WaitlistEntry, EntryFilter>,
    table_feed: Subscription,
    line_feed: Subscription,
}

impl StoreView {
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
        let table_feed = engine.subscribe(FeedFilter::store(Collection::Tables, store_id));
        let line_feed = engine.subscribe(FeedFilter::store(Collection::Waitlist, store_id));
        let mut view = Self {
            tables: ProjectionSet::new(TableFilter::scoped(store_id, rate.as_str())),
            line: ProjectionSet::new(EntryFilter::scoped(
                store_id,
                rate.as_str(),
                PLAYER_VISIBLE,
            )),
            engine,
            store,
            rate,
            table_feed,
            line_feed,
        };
        view.reload().await?;
        Ok(view)
    }

    pub fn line(&self) -> &[WaitlistEntry] {
        self.line.rows()
    }

    pub async fn reload(&mut self) -> Result<()> {
        let store_id = self.store.id;
        let tables = self
            .engine
            .tables(&TableQuery::for_store(store_id).rate(self.rate.as_str()))
            .await?;
        let line = self
            .engine
            .waitlist(
                &WaitlistQuery::for_store(store_id)
                    .rate(self.rate.as_str())
                    .statuses(PLAYER_VISIBLE),
            )
            .await?;
        self.tables.seed(tables);
        self.line.seed(line);
        Ok(())
    }

    pub async fn sync(&mut self, ctx: &mut SessionContext) -> Result<usize> {
        let tables = &mut self.tables;
        let (table_events, tables_lagged) = drain(&mut self.table_feed, |change| {
            if let Change::Tables(event) = change {
                tables.apply(&event);
            }
        });
        let line = &mut self.line;
        let (line_events, line_lagged) = drain(&mut self.line_feed, |change| {
            if let Change::Waitlist(event) = change {
                line.apply(&event);
            }
        });
        if tables_lagged || line_lagged {
            self.reload().await?;
            ctx.info(Message::ViewReloaded);
        }
        Ok(table_events + line_events)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.rows();
        let entries = self.line.rows();
        let line = entries
            .iter()
            .map(|entry| LineRow {
                position: occupancy::queue_position(entry, entries, QueueScope::WaitingOnly),
                player_name: entry.player_name.clone(),
                created_at: entry.created_at,
            })
            .collect();
        StoreSnapshot {
            store_id: self.store.id,
            store_name: self.store.name.clone(),
            rate: self.rate.clone(),
            signal: occupancy::signal_status(tables, entries),
            available_seats: occupancy::available_seats(tables),
            total_seats: occupancy::total_seats(tables),
            line,
        }
    }
}

/// Every store with its signal light.
pub struct MapView {
    engine: WaitlistEngine,
    stores: ProjectionSet<Store, AllStores>,
    tables: ProjectionSet<Table, TableFilter>,
    waiting: ProjectionSet<WaitlistEntry, EntryFilter>,
    store_feed: Subscription,
    table_feed: Subscription,
    waiting_feed: Subscription,
}

impl MapView {
    pub async fn open(engine: WaitlistEngine) -> Result<Self> {
        let store_feed = engine.subscribe(FeedFilter::all(Collection::Stores));
        let table_feed = engine.subscribe(FeedFilter::all(Collection::Tables));
        let waiting_feed = engine.subscribe(FeedFilter::all(Collection::Waitlist));
        let mut view = Self {
            engine,
            stores: ProjectionSet::new(AllStores),
            tables: ProjectionSet::new(TableFilter::default()),
            waiting: ProjectionSet::new(EntryFilter::everywhere(PLAYER_VISIBLE)),
            store_feed,
            table_feed,
            waiting_feed,
        };
        view.reload().await?;
        Ok(view)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let stores = self.engine.stores().await?;
        let tables = self.engine.tables(&TableQuery::default()).await?;
        let waiting = self
            .engine
            .waitlist(&WaitlistQuery::default().statuses(PLAYER_VISIBLE))
            .await?;
        self.stores.seed(stores);
        self.tables.seed(tables);
        self.waiting.seed(waiting);
        Ok(())
    }

    pub async fn sync(&mut self, ctx: &mut SessionContext) -> Result<usize> {
        let stores = &mut self.stores;
        let (store_events, stores_lagged) = drain(&mut self.store_feed, |change| {
            if let Change::Stores(event) = change {
                stores.apply(&event);
            }
        });
        let tables = &mut self.tables;
        let (table_events, tables_lagged) = drain(&mut self.table_feed, |change| {
            if let Change::Tables(event) = change {
                tables.apply(&event);
            }
        });
        let waiting = &mut self.waiting;
        let (waiting_events, waiting_lagged) = drain(&mut self.waiting_feed, |change| {
            if let Change::Waitlist(event) = change {
                waiting.apply(&event);
            }
        });
        if stores_lagged || tables_lagged || waiting_lagged {
            self.reload().await?;
            ctx.info(Message::ViewReloaded);
        }
        Ok(store_events + table_events + waiting_events)
    }

    pub fn snapshot(&self) -> Vec<StoreSignal> {
        occupancy::store_signals(self.stores.rows(), self.tables.rows(), self.waiting.rows())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MyEntrySnapshot {
    pub entry: Option<WaitlistEntry>,
    pub store_name: String,
    pub position: Option<usize>,
    /// Advisory only.
    pub estimated_call_at: Option<DateTime<Utc>>,
    pub called: bool,
}

/// A player's own entry and the line ahead of it.
pub struct MyEntryView {
    engine: WaitlistEngine,
    entry_id: EntryId,
    player_id: String,
    store_name: String,
    mine: ProjectionSet<WaitlistEntry, EntryFilter>,
    line: ProjectionSet<WaitlistEntry, EntryFilter>,
    feed: Subscription,
}

impl MyEntryView {
    /// Fails with `NotFound` for an entry that belongs to someone else.
    pub async fn open(
        engine: WaitlistEngine,
        entry_id: EntryId,
        player_id: &str,
    ) -> Result<Self> {
        let entry = engine.entry_by_id(entry_id).await?;
        if entry.player_id != player_id {
            return Err(WaitlistError::not_found("waitlist entry", entry_id));
        }
        let store = engine.store_by_id(entry.store_id).await?;
        let feed = engine.subscribe(FeedFilter::store(Collection::Waitlist, entry.store_id));
        let mut view = Self {
            line: ProjectionSet::new(line_filter(&entry)),
            mine: ProjectionSet::new(EntryFilter::single(entry_id)),
            engine,
            entry_id,
            player_id: player_id.to_string(),
            store_name: store.name,
            feed,
        };
        view.reload().await?;
        Ok(view)
    }

    pub fn entry(&self) -> Option<&WaitlistEntry> {
        self.mine.get(self.entry_id)
    }

    pub async fn reload(&mut self) -> Result<()> {
        let entry = self.engine.entry_by_id(self.entry_id).await?;
        let mut query = WaitlistQuery::for_store(entry.store_id).statuses(PLAYER_VISIBLE);
        if let Some(rate) = &entry.rate {
            query = query.rate(rate.as_str());
        }
        let line = self.engine.waitlist(&query).await?;
        self.line = ProjectionSet::new(line_filter(&entry));
        self.line.seed(line);
        self.mine.seed(vec![entry]);
        Ok(())
    }

    /// Folds pending events; tells the player when they have just been called.
    pub async fn sync(&mut self, ctx: &mut SessionContext) -> Result<usize> {
        let before = self.entry().cloned();
        let mine = &mut self.mine;
        let line = &mut self.line;
        let (applied, lagged) = drain(&mut self.feed, |change| {
            if let Change::Waitlist(event) = change {
                mine.apply(&event);
                line.apply(&event);
            }
        });

        let rate_moved = match (&before, self.entry()) {
            (Some(before), Some(after)) => before.rate != after.rate,
            _ => false,
        };
        if lagged || rate_moved {
            self.reload().await?;
            if lagged {
                ctx.info(Message::ViewReloaded);
            }
        }

        let was_called = before.is_some_and(|e| e.status == WaitlistStatus::Called);
        let is_called = self
            .entry()
            .is_some_and(|e| e.status == WaitlistStatus::Called);
        if is_called && !was_called {
            ctx.info(Message::YouAreCalled);
        }
        Ok(applied)
    }

    pub fn snapshot(&self) -> MyEntrySnapshot {
        let entry = self.entry().cloned();
        let (position, estimated_call_at) = match &entry {
            Some(e) if e.status == WaitlistStatus::Waiting => {
                let position =
                    occupancy::queue_position(e, self.line.rows(), QueueScope::WaitingOnly);
                (Some(position), Some(occupancy::estimate_call_time(e, position)))
            }
            _ => (None, None),
        };
        MyEntrySnapshot {
            called: entry
                .as_ref()
                .is_some_and(|e| e.status == WaitlistStatus::Called),
            entry,
            store_name: self.store_name.clone(),
            position,
            estimated_call_at,
        }
    }

    pub async fn cancel(&mut self, ctx: &mut SessionContext) -> Result<WaitlistEntry> {
        match self.engine.cancel_own(self.entry_id, &self.player_id).await {
            Ok(entry) => {
                self.mine.confirm(entry.clone());
                self.line.confirm(entry.clone());
                ctx.success(Message::EntryCancelled);
                Ok(entry)
            }
            Err(err) => {
                ctx.error(&err);
                Err(err)
            }
        }
    }
}

fn line_filter(entry: &WaitlistEntry) -> EntryFilter {
    EntryFilter {
        store_id: Some(entry.store_id),
        rate: entry.rate.clone(),
        entry_id: None,
        visible: PLAYER_VISIBLE,
    }
}
