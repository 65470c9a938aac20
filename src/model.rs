//! Strongly typed records for the three collections held by the store of record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WaitlistError;

pub type StoreId = Uuid;
pub type TableId = Uuid;
pub type EntryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// A poker room and the buy-in tiers it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub location: Coordinate,
    pub rates: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn offers_rate(&self, rate: &str) -> bool {
        self.rates.iter().any(|r| r == rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    Open,
    Closed,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Open => "open",
            TableStatus::Closed => "closed",
        }
    }
}

impl FromStr for TableStatus {
    type Err = WaitlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TableStatus::Open),
            "closed" => Ok(TableStatus::Closed),
            other => Err(WaitlistError::MalformedRow(format!(
                "unknown table status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical table at one buy-in tier.
///
/// `current_players` is only ever changed through the store's bounded
/// increment, so `current_players <= max_seats` holds for every row the
/// store hands out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub store_id: StoreId,
    pub rate: String,
    pub max_seats: u32,
    pub current_players: u32,
    pub status: TableStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Table {
    pub fn is_open(&self) -> bool {
        self.status == TableStatus::Open
    }

    pub fn is_full(&self) -> bool {
        self.current_players >= self.max_seats
    }

    /// Free seats counted toward availability. Closed tables count as zero.
    pub fn open_seats(&self) -> u32 {
        if self.is_open() {
            self.max_seats.saturating_sub(self.current_players)
        } else {
            0
        }
    }

    /// `clamp(current + delta, 0, max_seats)`.
    pub fn clamped_players(&self, delta: i32) -> u32 {
        clamp_players(self.current_players, delta, self.max_seats)
    }
}

pub fn clamp_players(current: u32, delta: i32, max_seats: u32) -> u32 {
    let target = i64::from(current) + i64::from(delta);
    target.clamp(0, i64::from(max_seats)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Waiting,
    Called,
    Arrived,
    Seated,
    Cancelled,
}

impl WaitlistStatus {
    pub const NON_TERMINAL: [WaitlistStatus; 3] = [
        WaitlistStatus::Waiting,
        WaitlistStatus::Called,
        WaitlistStatus::Arrived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistStatus::Waiting => "waiting",
            WaitlistStatus::Called => "called",
            WaitlistStatus::Arrived => "arrived",
            WaitlistStatus::Seated => "seated",
            WaitlistStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WaitlistStatus::Seated | WaitlistStatus::Cancelled)
    }
}

impl FromStr for WaitlistStatus {
    type Err = WaitlistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(WaitlistStatus::Waiting),
            "called" => Ok(WaitlistStatus::Called),
            "arrived" => Ok(WaitlistStatus::Arrived),
            "seated" => Ok(WaitlistStatus::Seated),
            "cancelled" => Ok(WaitlistStatus::Cancelled),
            other => Err(WaitlistError::MalformedRow(format!(
                "unknown waitlist status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One player's place in line for a store and rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: EntryId,
    pub store_id: StoreId,
    pub player_id: String,
    pub player_name: String,
    pub rate: Option<String>,
    pub status: WaitlistStatus,
    pub called_at: Option<DateTime<Utc>>,
    pub arrival_estimate_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn wants_rate(&self, rate: &str) -> bool {
        self.rate.as_deref() == Some(rate)
    }
}

/// Congestion summary for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Green,
    Yellow,
    Red,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip_and_reject_unknown() {
        for status in [
            WaitlistStatus::Waiting,
            WaitlistStatus::Called,
            WaitlistStatus::Arrived,
            WaitlistStatus::Seated,
            WaitlistStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<WaitlistStatus>().unwrap(), status);
        }
        assert!(matches!(
            "deleted".parse::<WaitlistStatus>(),
            Err(WaitlistError::MalformedRow(_))
        ));
        assert!("half-open".parse::<TableStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(WaitlistStatus::Seated.is_terminal());
        assert!(WaitlistStatus::Cancelled.is_terminal());
        assert!(
            WaitlistStatus::NON_TERMINAL
                .iter()
                .all(|status| !status.is_terminal())
        );
    }

    #[test]
    fn clamp_stays_within_bounds() {
        assert_eq!(clamp_players(3, 2, 9), 5);
        assert_eq!(clamp_players(8, 4, 9), 9);
        assert_eq!(clamp_players(1, -5, 9), 0);
        assert_eq!(clamp_players(0, i32::MIN, 9), 0);
        assert_eq!(clamp_players(9, i32::MAX, 9), 9);
    }
}
