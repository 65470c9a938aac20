//! Store of record backed by SeaORM.
//!
//! Multi-row writes run in one transaction. Seat counts are never written
//! from a value read earlier without a guard: the seat increment is a single
//! conditional `UPDATE ... WHERE current_players < max_seats`, and manual
//! adjustments are compare-and-swap on the observed count.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use super::{
    MonotonicClock, NewEntry, NewStore, NewTable, TablePatch, TableQuery, WaitlistQuery,
    WaitlistStore,
};
use crate::entities::{store, table, waitlist};
use crate::error::{Result, WaitlistError};
use crate::feed::{Change, ChangeEvent, ChangeFeed, FeedFilter, Subscription};
use crate::model::{
    Coordinate, EntryId, Store, StoreId, Table, TableId, TableStatus, WaitlistEntry,
    WaitlistStatus,
};

pub struct SeaOrmStore {
    db: DatabaseConnection,
    clock: MonotonicClock,
    feed: ChangeFeed,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self::with_feed(db, ChangeFeed::default())
    }

    pub fn with_feed(db: DatabaseConnection, feed: ChangeFeed) -> Self {
        Self {
            db,
            clock: MonotonicClock::default(),
            feed,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl TryFrom<store::Model> for Store {
    type Error = WaitlistError;

    fn try_from(row: store::Model) -> Result<Self> {
        let rates: Vec<String> = serde_json::from_value(row.rates).map_err(|err| {
            WaitlistError::MalformedRow(format!("store {} rates: {err}", row.id))
        })?;
        Ok(Store {
            id: row.id,
            name: row.name,
            location: Coordinate {
                lat: row.lat,
                lng: row.lng,
            },
            rates,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        })
    }
}

fn seat_count(value: i32, column: &str, id: Uuid) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| WaitlistError::MalformedRow(format!("table {id} has {column} = {value}")))
}

impl TryFrom<table::Model> for Table {
    type Error = WaitlistError;

    fn try_from(row: table::Model) -> Result<Self> {
        let max_seats = seat_count(row.max_seats, "max_seats", row.id)?;
        let current_players = seat_count(row.current_players, "current_players", row.id)?;
        if current_players > max_seats {
            return Err(WaitlistError::MalformedRow(format!(
                "table {} seats {current_players} of {max_seats}",
                row.id
            )));
        }
        Ok(Table {
            id: row.id,
            store_id: row.store_id,
            rate: row.rate,
            max_seats,
            current_players,
            status: row.status.parse()?,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        })
    }
}

impl TryFrom<waitlist::Model> for WaitlistEntry {
    type Error = WaitlistError;

    fn try_from(row: waitlist::Model) -> Result<Self> {
        let arrival_estimate_minutes = row
            .arrival_estimation_minutes
            .map(|minutes| {
                u32::try_from(minutes).map_err(|_| {
                    WaitlistError::MalformedRow(format!(
                        "waitlist {} arrival estimate {minutes}",
                        row.id
                    ))
                })
            })
            .transpose()?;
        Ok(WaitlistEntry {
            id: row.id,
            store_id: row.store_id,
            player_id: row.user_id,
            player_name: row.user_name,
            rate: row.rate_preference,
            status: row.status.parse()?,
            called_at: row.called_at.map(|at| at.with_timezone(&Utc)),
            arrival_estimate_minutes,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        })
    }
}

fn collect<M, T>(rows: Vec<M>) -> Result<Vec<T>>
where
    T: TryFrom<M, Error = WaitlistError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn seats(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn statuses(set: &[WaitlistStatus]) -> Vec<&'static str> {
    set.iter().map(|status| status.as_str()).collect()
}

#[async_trait]
impl WaitlistStore for SeaOrmStore {
    async fn list_stores(&self) -> Result<Vec<Store>> {
        let rows = store::Entity::find()
            .order_by_asc(store::Column::CreatedAt)
            .all(&self.db)
            .await?;
        collect(rows)
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        store::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    async fn insert_store(&self, new: NewStore) -> Result<Store> {
        let now = self.clock.now().fixed_offset();
        let row = store::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(new.name),
            lat: Set(new.location.lat),
            lng: Set(new.location.lng),
            rates: Set(serde_json::json!(new.rates)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        let store = Store::try_from(row)?;
        debug!(store_id = %store.id, name = %store.name, "inserted store");
        self.feed.publish(Change::Stores(ChangeEvent::Insert {
            new: store.clone(),
        }));
        Ok(store)
    }

    async fn update_store_rates(&self, id: StoreId, rates: Vec<String>) -> Result<Store> {
        let now = self.clock.now().fixed_offset();
        let txn = self.db.begin().await?;
        let row = store::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| WaitlistError::not_found("store", id))?;
        let old = Store::try_from(row.clone())?;

        let mut active: store::ActiveModel = row.into();
        active.rates = Set(serde_json::json!(rates));
        active.updated_at = Set(now);
        let new = Store::try_from(active.update(&txn).await?)?;
        txn.commit().await?;

        debug!(store_id = %id, rates = ?new.rates, "updated store rates");
        self.feed.publish(Change::Stores(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn rename_rate(&self, store_id: StoreId, from: &str, to: &str) -> Result<Store> {
        let now = self.clock.now();
        let stamp = now.fixed_offset();
        let txn = self.db.begin().await?;

        let row = store::Entity::find_by_id(store_id)
            .one(&txn)
            .await?
            .ok_or_else(|| WaitlistError::not_found("store", store_id))?;
        let old_store = Store::try_from(row.clone())?;
        let rates: Vec<String> = old_store
            .rates
            .iter()
            .map(|rate| if rate == from { to.to_string() } else { rate.clone() })
            .collect();
        let mut active: store::ActiveModel = row.into();
        active.rates = Set(serde_json::json!(rates));
        active.updated_at = Set(stamp);
        let new_store = Store::try_from(active.update(&txn).await?)?;

        let old_tables: Vec<Table> = collect(
            table::Entity::find()
                .filter(table::Column::StoreId.eq(store_id))
                .filter(table::Column::Rate.eq(from))
                .all(&txn)
                .await?,
        )?;
        table::Entity::update_many()
            .col_expr(table::Column::Rate, Expr::value(to))
            .col_expr(table::Column::UpdatedAt, Expr::value(stamp))
            .filter(table::Column::StoreId.eq(store_id))
            .filter(table::Column::Rate.eq(from))
            .exec(&txn)
            .await?;

        let old_entries: Vec<WaitlistEntry> = collect(
            waitlist::Entity::find()
                .filter(waitlist::Column::StoreId.eq(store_id))
                .filter(waitlist::Column::RatePreference.eq(from))
                .all(&txn)
                .await?,
        )?;
        waitlist::Entity::update_many()
            .col_expr(waitlist::Column::RatePreference, Expr::value(to))
            .col_expr(waitlist::Column::UpdatedAt, Expr::value(stamp))
            .filter(waitlist::Column::StoreId.eq(store_id))
            .filter(waitlist::Column::RatePreference.eq(from))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        debug!(
            %store_id, from, to,
            tables = old_tables.len(),
            entries = old_entries.len(),
            "renamed rate"
        );

        self.feed.publish(Change::Stores(ChangeEvent::Update {
            old: old_store,
            new: new_store.clone(),
        }));
        for old in old_tables {
            let new = Table {
                rate: to.to_string(),
                updated_at: now,
                ..old.clone()
            };
            self.feed.publish(Change::Tables(ChangeEvent::Update { old, new }));
        }
        for old in old_entries {
            let new = WaitlistEntry {
                rate: Some(to.to_string()),
                updated_at: now,
                ..old.clone()
            };
            self.feed
                .publish(Change::Waitlist(ChangeEvent::Update { old, new }));
        }
        Ok(new_store)
    }

    async fn list_tables(&self, query: &TableQuery) -> Result<Vec<Table>> {
        let mut select = table::Entity::find();
        if let Some(store_id) = query.store_id {
            select = select.filter(table::Column::StoreId.eq(store_id));
        }
        if let Some(rate) = &query.rate {
            select = select.filter(table::Column::Rate.eq(rate.as_str()));
        }
        if let Some(status) = query.status {
            select = select.filter(table::Column::Status.eq(status.as_str()));
        }
        let rows = select
            .order_by_asc(table::Column::CreatedAt)
            .all(&self.db)
            .await?;
        collect(rows)
    }

    async fn get_table(&self, id: TableId) -> Result<Option<Table>> {
        table::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Table::try_from)
            .transpose()
    }

    async fn insert_table(&self, new: NewTable) -> Result<Table> {
        if self.get_store(new.store_id).await?.is_none() {
            return Err(WaitlistError::not_found("store", new.store_id));
        }
        let now = self.clock.now().fixed_offset();
        let row = table::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(new.store_id),
            rate: Set(new.rate),
            max_seats: Set(seats(new.max_seats)),
            current_players: Set(0),
            status: Set(new.status.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        let table = Table::try_from(row)?;
        debug!(
            table_id = %table.id,
            store_id = %table.store_id,
            rate = %table.rate,
            "inserted table"
        );
        self.feed.publish(Change::Tables(ChangeEvent::Insert {
            new: table.clone(),
        }));
        Ok(table)
    }

    async fn update_table(&self, id: TableId, patch: TablePatch) -> Result<Table> {
        let now = self.clock.now().fixed_offset();
        let txn = self.db.begin().await?;
        let old = table::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", id))?;

        let mut update = table::Entity::update_many()
            .col_expr(table::Column::UpdatedAt, Expr::value(now))
            .filter(table::Column::Id.eq(id));
        if let Some(rate) = &patch.rate {
            update = update.col_expr(table::Column::Rate, Expr::value(rate.as_str()));
        }
        if let Some(status) = patch.status {
            update = update.col_expr(table::Column::Status, Expr::value(status.as_str()));
        }
        if let Some(max_seats) = patch.max_seats {
            update = update
                .col_expr(table::Column::MaxSeats, Expr::value(seats(max_seats)))
                .filter(table::Column::CurrentPlayers.lte(seats(max_seats)));
        }
        if update.exec(&txn).await?.rows_affected == 0 {
            let current = table::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .map(Table::try_from)
                .transpose()?
                .ok_or_else(|| WaitlistError::not_found("table", id))?;
            return Err(WaitlistError::validation(format!(
                "{} players are seated; cannot reduce the table to {} seats",
                current.current_players,
                patch.max_seats.unwrap_or(current.max_seats)
            )));
        }

        let new = table::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        txn.commit().await?;

        debug!(table_id = %id, ?patch, "updated table");
        self.feed.publish(Change::Tables(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn delete_table(&self, id: TableId) -> Result<Table> {
        let txn = self.db.begin().await?;
        let old = table::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", id))?;

        let deleted = table::Entity::delete_many()
            .filter(table::Column::Id.eq(id))
            .filter(table::Column::CurrentPlayers.eq(0))
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            return Err(WaitlistError::Conflict(format!(
                "{} players are still seated at this table",
                old.current_players
            )));
        }
        txn.commit().await?;

        debug!(table_id = %id, "deleted table");
        self.feed
            .publish(Change::Tables(ChangeEvent::Delete { old: old.clone() }));
        Ok(old)
    }

    async fn adjust_players(&self, id: TableId, delta: i32) -> Result<Table> {
        let txn = self.db.begin().await?;
        let old = table::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", id))?;

        let moved = || Expr::col(table::Column::CurrentPlayers).add(delta);
        let clamped = Expr::case(Expr::expr(moved()).lt(0), 0)
            .case(
                Expr::expr(moved()).gt(Expr::col(table::Column::MaxSeats)),
                Expr::col(table::Column::MaxSeats),
            )
            .finally(moved());
        table::Entity::update_many()
            .col_expr(table::Column::CurrentPlayers, clamped.into())
            .col_expr(
                table::Column::UpdatedAt,
                Expr::value(self.clock.now().fixed_offset()),
            )
            .filter(table::Column::Id.eq(id))
            .exec(&txn)
            .await?;

        let new = table::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", id))?;
        txn.commit().await?;

        debug!(
            table_id = %id,
            delta,
            from = old.current_players,
            to = new.current_players,
            "adjusted players"
        );
        self.feed.publish(Change::Tables(ChangeEvent::Update {
            old,
            new: new.clone(),
        }));
        Ok(new)
    }

    async fn list_waitlist(&self, query: &WaitlistQuery) -> Result<Vec<WaitlistEntry>> {
        let mut select = waitlist::Entity::find();
        if let Some(store_id) = query.store_id {
            select = select.filter(waitlist::Column::StoreId.eq(store_id));
        }
        if let Some(rate) = &query.rate {
            select = select.filter(waitlist::Column::RatePreference.eq(rate.as_str()));
        }
        if let Some(player_id) = &query.player_id {
            select = select.filter(waitlist::Column::UserId.eq(player_id.as_str()));
        }
        if let Some(set) = &query.statuses {
            select = select.filter(waitlist::Column::Status.is_in(statuses(set)));
        }
        if let Some(at) = query.created_before {
            select = select.filter(waitlist::Column::CreatedAt.lt(at.fixed_offset()));
        }
        if let Some(at) = query.created_after {
            select = select.filter(waitlist::Column::CreatedAt.gt(at.fixed_offset()));
        }
        let rows = select
            .order_by_asc(waitlist::Column::CreatedAt)
            .all(&self.db)
            .await?;
        collect(rows)
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>> {
        waitlist::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()
    }

    async fn insert_entry(&self, new: NewEntry) -> Result<WaitlistEntry> {
        if self.get_store(new.store_id).await?.is_none() {
            return Err(WaitlistError::not_found("store", new.store_id));
        }
        let now = self.clock.now().fixed_offset();
        let row = waitlist::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(new.store_id),
            user_id: Set(new.player_id),
            user_name: Set(new.player_name),
            rate_preference: Set(new.rate),
            status: Set(WaitlistStatus::Waiting.as_str().to_string()),
            called_at: Set(None),
            arrival_estimation_minutes: Set(new.arrival_estimate_minutes.map(seats)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await?;
        let entry = WaitlistEntry::try_from(row)?;
        debug!(entry_id = %entry.id, store_id = %entry.store_id, "inserted waitlist entry");
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
        let now = self.clock.now().fixed_offset();
        let txn = self.db.begin().await?;
        let Some(row) = waitlist::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };
        let old = WaitlistEntry::try_from(row)?;

        let mut update = waitlist::Entity::update_many()
            .col_expr(waitlist::Column::Status, Expr::value(to.as_str()))
            .col_expr(waitlist::Column::UpdatedAt, Expr::value(now))
            .filter(waitlist::Column::Id.eq(id))
            .filter(waitlist::Column::Status.is_in(statuses(expected)));
        if let Some(at) = called_at {
            update = update.col_expr(
                waitlist::Column::CalledAt,
                Expr::value(Some(at.fixed_offset())),
            );
        }
        if update.exec(&txn).await?.rows_affected == 0 {
            return Ok(None);
        }

        let new = waitlist::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("waitlist entry", id))?;
        txn.commit().await?;

        debug!(entry_id = %id, from = %old.status, to = %new.status, "transitioned entry");
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
        let now = self.clock.now().fixed_offset();
        let txn = self.db.begin().await?;

        let old_entry = waitlist::Entity::find_by_id(entry_id)
            .one(&txn)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("waitlist entry", entry_id))?;
        if old_entry.status.is_terminal() {
            return Err(WaitlistError::InvalidTransition {
                action: "seat",
                from: old_entry.status,
            });
        }
        let old_table = table::Entity::find_by_id(table_id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", table_id))?;
        let Some(rate) = old_entry
            .rate
            .as_deref()
            .filter(|rate| *rate == old_table.rate)
        else {
            return Err(WaitlistError::validation(
                "table is not an open table at the entry's store and rate",
            ));
        };
        if old_table.store_id != old_entry.store_id || !old_table.is_open() {
            return Err(WaitlistError::validation(
                "table is not an open table at the entry's store and rate",
            ));
        }

        let incremented = table::Entity::update_many()
            .col_expr(
                table::Column::CurrentPlayers,
                Expr::col(table::Column::CurrentPlayers).add(1),
            )
            .col_expr(table::Column::UpdatedAt, Expr::value(now))
            .filter(table::Column::Id.eq(table_id))
            .filter(table::Column::StoreId.eq(old_entry.store_id))
            .filter(table::Column::Rate.eq(rate))
            .filter(table::Column::Status.eq(TableStatus::Open.as_str()))
            .filter(
                Expr::col(table::Column::CurrentPlayers).lt(Expr::col(table::Column::MaxSeats)),
            )
            .exec(&txn)
            .await?;
        if incremented.rows_affected == 0 {
            return Err(WaitlistError::Capacity(table_id));
        }

        let seated = waitlist::Entity::update_many()
            .col_expr(
                waitlist::Column::Status,
                Expr::value(WaitlistStatus::Seated.as_str()),
            )
            .col_expr(waitlist::Column::UpdatedAt, Expr::value(now))
            .filter(waitlist::Column::Id.eq(entry_id))
            .filter(
                waitlist::Column::Status.is_in(statuses(&WaitlistStatus::NON_TERMINAL)),
            )
            .exec(&txn)
            .await?;
        if seated.rows_affected == 0 {
            // Dropping the transaction rolls the increment back.
            return Err(WaitlistError::InvalidTransition {
                action: "seat",
                from: old_entry.status,
            });
        }

        let new_table = table::Entity::find_by_id(table_id)
            .one(&txn)
            .await?
            .map(Table::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("table", table_id))?;
        let new_entry = waitlist::Entity::find_by_id(entry_id)
            .one(&txn)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()?
            .ok_or_else(|| WaitlistError::not_found("waitlist entry", entry_id))?;
        txn.commit().await?;

        debug!(
            %entry_id, %table_id,
            players = new_table.current_players,
            max_seats = new_table.max_seats,
            "seated entry"
        );
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
