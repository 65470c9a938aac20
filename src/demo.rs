//! Demo rooms loaded in mock mode.

use tracing::info;

use crate::engine::{CheckIn, WaitlistEngine};
use crate::error::Result;
use crate::model::{Coordinate, TableStatus};

struct DemoStore {
    name: &'static str,
    location: Coordinate,
    rates: &'static [&'static str],
    /// `(rate, max_seats, current_players)`
    tables: &'static [(&'static str, u32, i32)],
    /// `(player_id, name, rate, arrival_estimate_minutes)`
    waiting: &'static [(&'static str, &'static str, &'static str, u32)],
}

const DEMO_STORES: &[DemoStore] = &[
    DemoStore {
        name: "CTP Taipei",
        location: Coordinate {
            lat: 25.0330,
            lng: 121.5654,
        },
        rates: &["1/3", "2/5", "5/10+"],
        tables: &[("1/3", 9, 8), ("2/5", 9, 6), ("5/10+", 9, 9)],
        waiting: &[
            ("user-001", "王小明", "1/3", 15),
            ("user-002", "李美玲", "1/3", 30),
        ],
    },
    DemoStore {
        name: "Guild A",
        location: Coordinate {
            lat: 25.0478,
            lng: 121.5318,
        },
        rates: &["1/2", "2/5"],
        tables: &[("1/2", 9, 9), ("2/5", 9, 9)],
        waiting: &[
            ("user-003", "陳大文", "1/2", 15),
            ("user-004", "林小華", "1/2", 30),
            ("user-005", "張三", "1/2", 45),
            ("user-006", "李四", "1/2", 60),
            ("user-007", "王五", "1/2", 30),
        ],
    },
    DemoStore {
        name: "Poker Arena",
        location: Coordinate {
            lat: 25.0408,
            lng: 121.5680,
        },
        rates: &["1/3", "2/5", "5/10+", "10/20"],
        tables: &[("1/3", 9, 3), ("2/5", 9, 5)],
        waiting: &[],
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoSeed {
    pub stores: usize,
    pub tables: usize,
    pub entries: usize,
}

/// Loads the demo rooms through the engine, so they pass the same checks as live input.
pub async fn seed(engine: &WaitlistEngine) -> Result<DemoSeed> {
    let mut seeded = DemoSeed::default();
    for demo in DEMO_STORES {
        let rates: Vec<String> = demo.rates.iter().map(|r| r.to_string()).collect();
        let store = engine
            .register_store(demo.name, demo.location, &rates)
            .await?;
        seeded.stores += 1;

        for &(rate, max_seats, players) in demo.tables {
            let table = engine
                .add_table(store.id, rate, max_seats, TableStatus::Open)
                .await?;
            if players > 0 {
                engine.adjust_seats(table.id, players).await?;
            }
            seeded.tables += 1;
        }

        for &(player_id, name, rate, minutes) in demo.waiting {
            engine
                .check_in(CheckIn {
                    store_id: store.id,
                    rate: rate.to_string(),
                    player_id: player_id.to_string(),
                    player_name: name.to_string(),
                    arrival_estimate_minutes: Some(minutes),
                })
                .await?;
            seeded.entries += 1;
        }
    }
    info!(
        stores = seeded.stores,
        tables = seeded.tables,
        entries = seeded.entries,
        "demo data loaded"
    );
    Ok(seeded)
}
