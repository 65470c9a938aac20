//! Pure occupancy rules evaluated over a snapshot of tables and waitlist rows.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{
    Coordinate, SignalStatus, Store, StoreId, Table, WaitlistEntry, WaitlistStatus,
};

/// Minutes each player ahead in line is assumed to take before the next call.
pub const SERVICE_MINUTES_PER_PLAYER: i64 = 20;

/// A full store stays yellow while at most this many players are waiting.
pub const YELLOW_MAX_WAITING: usize = 3;

/// A called player who has not shown up after this long gets flagged.
pub const CALL_OVERDUE_MINUTES: i64 = 10;

/// Which statuses hold a place in line when computing a queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueScope {
    #[default]
    WaitingOnly,
    /// Called and arrived players still count as ahead of you.
    Active,
}

impl QueueScope {
    fn holds_place(&self, status: WaitlistStatus) -> bool {
        match self {
            QueueScope::WaitingOnly => status == WaitlistStatus::Waiting,
            QueueScope::Active => !status.is_terminal(),
        }
    }
}

/// Sum of free seats over open tables.
pub fn available_seats(tables: &[Table]) -> u32 {
    tables.iter().map(Table::open_seats).sum()
}

pub fn total_seats(tables: &[Table]) -> u32 {
    tables.iter().map(|t| t.max_seats).sum()
}

pub fn waiting_count(waitlist: &[WaitlistEntry]) -> usize {
    waitlist
        .iter()
        .filter(|w| w.status == WaitlistStatus::Waiting)
        .count()
}

/// Green when any open seat exists, yellow when full with a short line, red otherwise.
///
/// With no open tables and nobody waiting this yields yellow: zero available
/// seats is not "seats available".
pub fn signal_status(tables: &[Table], waitlist: &[WaitlistEntry]) -> SignalStatus {
    if available_seats(tables) > 0 {
        SignalStatus::Green
    } else if waiting_count(waitlist) <= YELLOW_MAX_WAITING {
        SignalStatus::Yellow
    } else {
        SignalStatus::Red
    }
}

/// 1-based position of `entry` among `entries` sharing its store and rate.
///
/// Counts every other in-scope entry created at or before `entry`, plus the
/// entry itself. Identical creation timestamps share a position.
pub fn queue_position(
    entry: &WaitlistEntry,
    entries: &[WaitlistEntry],
    scope: QueueScope,
) -> usize {
    let ahead = entries
        .iter()
        .filter(|other| other.id != entry.id)
        .filter(|other| other.store_id == entry.store_id && other.rate == entry.rate)
        .filter(|other| scope.holds_place(other.status))
        .filter(|other| other.created_at <= entry.created_at)
        .count();
    ahead + 1
}

/// Advisory call time: check-in + travel estimate + 20 minutes per position.
pub fn estimate_call_time(entry: &WaitlistEntry, position: usize) -> DateTime<Utc> {
    let travel = i64::from(entry.arrival_estimate_minutes.unwrap_or(0));
    let queue = position as i64 * SERVICE_MINUTES_PER_PLAYER;
    entry.created_at + Duration::minutes(travel + queue)
}

/// Whole minutes elapsed since the entry was called, if it is currently called.
pub fn minutes_since_called(entry: &WaitlistEntry, now: DateTime<Utc>) -> Option<i64> {
    match (entry.status, entry.called_at) {
        (WaitlistStatus::Called, Some(called_at)) => Some((now - called_at).num_minutes()),
        _ => None,
    }
}

pub fn is_call_overdue(entry: &WaitlistEntry, now: DateTime<Utc>) -> bool {
    minutes_since_called(entry, now).is_some_and(|minutes| minutes >= CALL_OVERDUE_MINUTES)
}

/// Congestion summary for one store, as shown on the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSignal {
    pub store_id: StoreId,
    pub name: String,
    pub location: Coordinate,
    pub signal: SignalStatus,
    pub available_seats: u32,
    pub total_seats: u32,
    pub waiting: usize,
}

/// Partitions tables and waitlist rows by store and summarizes each store.
pub fn store_signals(
    stores: &[Store],
    tables: &[Table],
    waitlist: &[WaitlistEntry],
) -> Vec<StoreSignal> {
    stores
        .iter()
        .map(|store| {
            let tables: Vec<Table> = tables
                .iter()
                .filter(|t| t.store_id == store.id)
                .cloned()
                .collect();
            let waitlist: Vec<WaitlistEntry> = waitlist
                .iter()
                .filter(|w| w.store_id == store.id)
                .cloned()
                .collect();
            StoreSignal {
                store_id: store.id,
                name: store.name.clone(),
                location: store.location,
                signal: signal_status(&tables, &waitlist),
                available_seats: available_seats(&tables),
                total_seats: total_seats(&tables),
                waiting: waiting_count(&waitlist),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableStatus;
    use uuid::Uuid;

    fn table(max_seats: u32, current_players: u32, status: TableStatus) -> Table {
        Table {
            id: Uuid::new_v4(),
            store_id: Uuid::nil(),
            rate: "1/3".to_string(),
            max_seats,
            current_players,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn entry(status: WaitlistStatus, created_at: DateTime<Utc>) -> WaitlistEntry {
        WaitlistEntry {
            id: Uuid::new_v4(),
            store_id: Uuid::nil(),
            player_id: "p".to_string(),
            player_name: "Player".to_string(),
            rate: Some("1/3".to_string()),
            status,
            called_at: None,
            arrival_estimate_minutes: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn closed_tables_contribute_no_seats() {
        let tables = vec![
            table(9, 5, TableStatus::Open),
            table(9, 0, TableStatus::Closed),
        ];
        assert_eq!(available_seats(&tables), 4);
        assert_eq!(total_seats(&tables), 18);
    }

    #[test]
    fn full_store_turns_red_on_fourth_waiting_player() {
        let tables = vec![table(9, 9, TableStatus::Open)];
        let now = Utc::now();
        let mut waitlist: Vec<_> = (0..3)
            .map(|i| entry(WaitlistStatus::Waiting, now + Duration::seconds(i)))
            .collect();
        assert_eq!(signal_status(&tables, &waitlist), SignalStatus::Yellow);

        waitlist.push(entry(WaitlistStatus::Waiting, now + Duration::seconds(10)));
        assert_eq!(signal_status(&tables, &waitlist), SignalStatus::Red);
    }

    #[test]
    fn called_players_do_not_count_toward_red() {
        let tables = vec![table(9, 9, TableStatus::Open)];
        let now = Utc::now();
        let waitlist: Vec<_> = (0..5)
            .map(|i| entry(WaitlistStatus::Called, now + Duration::seconds(i)))
            .collect();
        assert_eq!(signal_status(&tables, &waitlist), SignalStatus::Yellow);
    }

    #[test]
    fn empty_store_is_yellow() {
        assert_eq!(signal_status(&[], &[]), SignalStatus::Yellow);
    }

    #[test]
    fn any_open_seat_is_green() {
        let tables = vec![table(9, 8, TableStatus::Open)];
        let now = Utc::now();
        let waitlist: Vec<_> = (0..10)
            .map(|i| entry(WaitlistStatus::Waiting, now + Duration::seconds(i)))
            .collect();
        assert_eq!(signal_status(&tables, &waitlist), SignalStatus::Green);
    }

    #[test]
    fn first_created_entry_is_first_in_line() {
        let now = Utc::now();
        let first = entry(WaitlistStatus::Waiting, now);
        let second = entry(WaitlistStatus::Waiting, now + Duration::seconds(5));
        let third = entry(WaitlistStatus::Waiting, now + Duration::seconds(9));
        let all = vec![third.clone(), first.clone(), second.clone()];

        assert_eq!(queue_position(&first, &all, QueueScope::WaitingOnly), 1);
        assert_eq!(queue_position(&second, &all, QueueScope::WaitingOnly), 2);
        assert_eq!(queue_position(&third, &all, QueueScope::WaitingOnly), 3);
    }

    #[test]
    fn other_rates_and_statuses_do_not_hold_a_place() {
        let now = Utc::now();
        let mut other_rate = entry(WaitlistStatus::Waiting, now);
        other_rate.rate = Some("2/5".to_string());
        let called = entry(WaitlistStatus::Called, now + Duration::seconds(1));
        let me = entry(WaitlistStatus::Waiting, now + Duration::seconds(2));
        let all = vec![other_rate, called, me.clone()];

        assert_eq!(queue_position(&me, &all, QueueScope::WaitingOnly), 1);
        assert_eq!(queue_position(&me, &all, QueueScope::Active), 2);
    }

    #[test]
    fn identical_timestamps_share_a_position() {
        let now = Utc::now();
        let a = entry(WaitlistStatus::Waiting, now);
        let b = entry(WaitlistStatus::Waiting, now);
        let all = vec![a.clone(), b.clone()];
        assert_eq!(queue_position(&a, &all, QueueScope::WaitingOnly), 2);
        assert_eq!(queue_position(&b, &all, QueueScope::WaitingOnly), 2);
    }

    #[test]
    fn estimate_adds_travel_and_service_time() {
        let now = Utc::now();
        let mut e = entry(WaitlistStatus::Waiting, now);
        e.arrival_estimate_minutes = Some(15);
        assert_eq!(estimate_call_time(&e, 2), now + Duration::minutes(55));

        e.arrival_estimate_minutes = None;
        assert_eq!(estimate_call_time(&e, 1), now + Duration::minutes(20));
    }

    #[test]
    fn signals_are_computed_per_store() {
        let now = Utc::now();
        let store = |name: &str| Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: Coordinate { lat: 25.0, lng: 121.5 },
            rates: vec!["1/3".to_string()],
            created_at: now,
            updated_at: now,
        };
        let busy = store("Guild A");
        let quiet = store("Poker Arena");

        let mut full = table(9, 9, TableStatus::Open);
        full.store_id = busy.id;
        let mut open = table(9, 2, TableStatus::Open);
        open.store_id = quiet.id;
        let waitlist: Vec<_> = (0..4)
            .map(|i| {
                let mut e = entry(WaitlistStatus::Waiting, now + Duration::seconds(i));
                e.store_id = busy.id;
                e
            })
            .collect();

        let signals = store_signals(&[busy.clone(), quiet.clone()], &[full, open], &waitlist);
        assert_eq!(signals[0].signal, SignalStatus::Red);
        assert_eq!(signals[0].waiting, 4);
        assert_eq!(signals[1].signal, SignalStatus::Green);
        assert_eq!(signals[1].available_seats, 7);
    }

    #[test]
    fn overdue_after_ten_minutes_called() {
        let now = Utc::now();
        let mut e = entry(WaitlistStatus::Called, now - Duration::minutes(30));
        e.called_at = Some(now - Duration::minutes(9));
        assert!(!is_call_overdue(&e, now));
        e.called_at = Some(now - Duration::minutes(10));
        assert!(is_call_overdue(&e, now));

        e.status = WaitlistStatus::Arrived;
        assert!(!is_call_overdue(&e, now));
    }
}
