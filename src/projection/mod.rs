//! Local mirrors of the store kept current by folding change events.
//!
//! Every view folds events through the same [`merge`]; views differ only in
//! the filter they pass. Two views with the same filter that have seen the
//! same events hold the same rows.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::feed::ChangeEvent;
use crate::model::{Store, StoreId, Table, WaitlistEntry, WaitlistStatus};

pub mod admin;
pub mod player;

pub use admin::{AdminDashboard, DashboardSnapshot, QueueRow};
pub use player::{MapView, MyEntrySnapshot, MyEntryView, StoreSnapshot, StoreView};

/// Statuses staff see on the dashboard.
pub const ADMIN_VISIBLE: &[WaitlistStatus] = &[
    WaitlistStatus::Waiting,
    WaitlistStatus::Called,
    WaitlistStatus::Arrived,
];

/// Statuses players see in a store's line.
pub const PLAYER_VISIBLE: &[WaitlistStatus] = &[WaitlistStatus::Waiting];

pub trait Row: Clone {
    fn key(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
}

impl Row for Store {
    fn key(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Row for Table {
    fn key(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Row for WaitlistEntry {
    fn key(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Decides which rows a view holds.
pub trait ViewFilter<R> {
    fn admits(&self, row: &R) -> bool;
}

/// Every store.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllStores;

impl ViewFilter<Store> for AllStores {
    fn admits(&self, _: &Store) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilter {
    pub store_id: Option<StoreId>,
    pub rate: Option<String>,
}

impl TableFilter {
    pub fn scoped(store_id: StoreId, rate: impl Into<String>) -> Self {
        Self {
            store_id: Some(store_id),
            rate: Some(rate.into()),
        }
    }
}

impl ViewFilter<Table> for TableFilter {
    fn admits(&self, table: &Table) -> bool {
        self.store_id.is_none_or(|id| table.store_id == id)
            && self.rate.as_deref().is_none_or(|rate| table.rate == rate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryFilter {
    pub store_id: Option<StoreId>,
    pub rate: Option<String>,
    pub entry_id: Option<Uuid>,
    pub visible: &'static [WaitlistStatus],
}

impl EntryFilter {
    pub fn scoped(
        store_id: StoreId,
        rate: impl Into<String>,
        visible: &'static [WaitlistStatus],
    ) -> Self {
        Self {
            store_id: Some(store_id),
            rate: Some(rate.into()),
            entry_id: None,
            visible,
        }
    }

    pub fn everywhere(visible: &'static [WaitlistStatus]) -> Self {
        Self {
            store_id: None,
            rate: None,
            entry_id: None,
            visible,
        }
    }

    /// One entry in any status.
    pub fn single(entry_id: Uuid) -> Self {
        const ANY: &[WaitlistStatus] = &[
            WaitlistStatus::Waiting,
            WaitlistStatus::Called,
            WaitlistStatus::Arrived,
            WaitlistStatus::Seated,
            WaitlistStatus::Cancelled,
        ];
        Self {
            store_id: None,
            rate: None,
            entry_id: Some(entry_id),
            visible: ANY,
        }
    }
}

impl ViewFilter<WaitlistEntry> for EntryFilter {
    fn admits(&self, entry: &WaitlistEntry) -> bool {
        self.store_id.is_none_or(|id| entry.store_id == id)
            && self.rate.as_deref().is_none_or(|rate| entry.wants_rate(rate))
            && self.entry_id.is_none_or(|id| entry.id == id)
            && self.visible.contains(&entry.status)
    }
}

/// Folds one event into `rows`, kept ordered by `(created_at, key)`.
///
/// Insert and update both upsert when the new row is admitted, so an event
/// delivered twice, or an update arriving for a row never seen, converges.
/// An update whose new row is no longer admitted removes the row. Delete
/// removes unconditionally.
pub fn merge<R: Row>(rows: &mut Vec<R>, event: &ChangeEvent<R>, filter: &impl ViewFilter<R>) {
    match event {
        ChangeEvent::Insert { new } | ChangeEvent::Update { new, .. } => {
            if filter.admits(new) {
                upsert(rows, new.clone());
            } else {
                remove(rows, new.key());
            }
        }
        ChangeEvent::Delete { old } => {
            remove(rows, old.key());
        }
    }
}

fn upsert<R: Row>(rows: &mut Vec<R>, row: R) {
    remove(rows, row.key());
    let at = rows.partition_point(|existing| {
        (existing.created_at(), existing.key()) < (row.created_at(), row.key())
    });
    rows.insert(at, row);
}

fn remove<R: Row>(rows: &mut Vec<R>, key: Uuid) -> Option<R> {
    let index = rows.iter().position(|row| row.key() == key)?;
    Some(rows.remove(index))
}

/// The rows of one view plus the filter that scopes them.
#[derive(Debug, Clone)]
pub struct ProjectionSet<R, F> {
    rows: Vec<R>,
    filter: F,
}

impl<R: Row, F: ViewFilter<R>> ProjectionSet<R, F> {
    pub fn new(filter: F) -> Self {
        Self {
            rows: Vec::new(),
            filter,
        }
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    /// Replaces the contents with a fresh bulk read.
    pub fn seed(&mut self, rows: Vec<R>) {
        self.rows.clear();
        for row in rows.into_iter().filter(|row| self.filter.admits(row)) {
            upsert(&mut self.rows, row);
        }
    }

    pub fn apply(&mut self, event: &ChangeEvent<R>) {
        merge(&mut self.rows, event, &self.filter);
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn get(&self, key: Uuid) -> Option<&R> {
        self.rows.iter().find(|row| row.key() == key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Shows `row` before the store confirms it. Returns what it replaced so
    /// the caller can [`restore`](Self::restore) on failure.
    pub fn apply_optimistic(&mut self, row: R) -> Option<R> {
        let previous = self.get(row.key()).cloned();
        if self.filter.admits(&row) {
            upsert(&mut self.rows, row);
        } else {
            remove(&mut self.rows, row.key());
        }
        previous
    }

    /// Puts back the last confirmed value of a row.
    pub fn restore(&mut self, key: Uuid, previous: Option<R>) {
        match previous {
            Some(row) => upsert(&mut self.rows, row),
            None => {
                remove(&mut self.rows, key);
            }
        }
    }

    /// Applies a row the store just returned.
    pub fn confirm(&mut self, row: R) {
        self.apply(&ChangeEvent::Update {
            old: row.clone(),
            new: row,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(store_id: StoreId, status: WaitlistStatus, offset: i64) -> WaitlistEntry {
        let at = Utc::now() + Duration::seconds(offset);
        WaitlistEntry {
            id: Uuid::new_v4(),
            store_id,
            player_id: format!("p{offset}"),
            player_name: format!("Player {offset}"),
            rate: Some("1/3".to_string()),
            status,
            called_at: None,
            arrival_estimate_minutes: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn with_status(entry: &WaitlistEntry, status: WaitlistStatus) -> WaitlistEntry {
        WaitlistEntry {
            status,
            ..entry.clone()
        }
    }

    #[test]
    fn insert_outside_scope_is_ignored() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE));
        let other_store = entry(Uuid::new_v4(), WaitlistStatus::Waiting, 0);
        let mut other_rate = entry(store, WaitlistStatus::Waiting, 1);
        other_rate.rate = Some("2/5".to_string());

        set.apply(&ChangeEvent::Insert { new: other_store });
        set.apply(&ChangeEvent::Insert { new: other_rate });
        assert!(set.is_empty());
    }

    #[test]
    fn update_leaving_visible_set_removes_row() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE));
        let waiting = entry(store, WaitlistStatus::Waiting, 0);
        set.apply(&ChangeEvent::Insert {
            new: waiting.clone(),
        });

        let called = with_status(&waiting, WaitlistStatus::Called);
        set.apply(&ChangeEvent::Update {
            old: waiting.clone(),
            new: called.clone(),
        });
        assert_eq!(set.rows(), &[called.clone()]);

        set.apply(&ChangeEvent::Update {
            old: called.clone(),
            new: with_status(&called, WaitlistStatus::Seated),
        });
        assert!(set.is_empty());
    }

    #[test]
    fn update_entering_visible_set_inserts_row() {
        let store = Uuid::new_v4();
        let mut player = ProjectionSet::new(EntryFilter::scoped(store, "1/3", PLAYER_VISIBLE));
        let called = entry(store, WaitlistStatus::Called, 0);
        player.apply(&ChangeEvent::Insert {
            new: called.clone(),
        });
        assert!(player.is_empty());

        // A row moving back into scope shows up even though its insert was filtered.
        let waiting = with_status(&called, WaitlistStatus::Waiting);
        player.apply(&ChangeEvent::Update {
            old: called,
            new: waiting.clone(),
        });
        assert_eq!(player.rows(), &[waiting]);
    }

    #[test]
    fn duplicate_delivery_converges() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE));
        let e = entry(store, WaitlistStatus::Waiting, 0);
        let insert = ChangeEvent::Insert { new: e.clone() };
        set.apply(&insert);
        set.apply(&insert);
        assert_eq!(set.len(), 1);

        let delete = ChangeEvent::Delete { old: e };
        set.apply(&delete);
        set.apply(&delete);
        assert!(set.is_empty());
    }

    #[test]
    fn delete_of_an_unseen_row_leaves_the_rest() {
        let store = Uuid::new_v4();
        let filter = EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE);
        let kept = entry(store, WaitlistStatus::Waiting, 0);
        let mut rows = vec![kept.clone()];

        merge(
            &mut rows,
            &ChangeEvent::Delete {
                old: entry(store, WaitlistStatus::Waiting, 1),
            },
            &filter,
        );
        assert_eq!(rows, vec![kept.clone()]);

        merge(&mut rows, &ChangeEvent::Delete { old: kept }, &filter);
        assert!(rows.is_empty());
    }

    #[test]
    fn rows_stay_in_creation_order() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE));
        let late = entry(store, WaitlistStatus::Waiting, 30);
        let early = entry(store, WaitlistStatus::Waiting, 0);
        let middle = entry(store, WaitlistStatus::Waiting, 10);
        for e in [&late, &early, &middle] {
            set.apply(&ChangeEvent::Insert { new: e.clone() });
        }
        let ids: Vec<_> = set.rows().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![early.id, middle.id, late.id]);
    }

    #[test]
    fn optimistic_change_can_be_restored() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", ADMIN_VISIBLE));
        let waiting = entry(store, WaitlistStatus::Waiting, 0);
        set.seed(vec![waiting.clone()]);

        let previous = set.apply_optimistic(with_status(&waiting, WaitlistStatus::Called));
        assert_eq!(set.rows()[0].status, WaitlistStatus::Called);

        set.restore(waiting.id, previous);
        assert_eq!(set.rows(), &[waiting]);
    }

    #[test]
    fn seed_applies_the_filter() {
        let store = Uuid::new_v4();
        let mut set = ProjectionSet::new(EntryFilter::scoped(store, "1/3", PLAYER_VISIBLE));
        set.seed(vec![
            entry(store, WaitlistStatus::Waiting, 0),
            entry(store, WaitlistStatus::Called, 1),
            entry(store, WaitlistStatus::Cancelled, 2),
        ]);
        assert_eq!(set.len(), 1);
    }
}
