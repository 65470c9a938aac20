use std::sync::Arc;

use chrono::Utc;

use waitlist_rs::context::{Locale, Message, NoticeLevel, SessionContext};
use waitlist_rs::engine::{CheckIn, WaitlistEngine};
use waitlist_rs::feed::ChangeFeed;
use waitlist_rs::model::{
    Coordinate, SignalStatus, Store, Table, TableStatus, WaitlistEntry, WaitlistStatus,
};
use waitlist_rs::projection::{AdminDashboard, MapView, MyEntryView, StoreView};
use waitlist_rs::store::InMemoryStore;

struct Room {
    store: Arc<InMemoryStore>,
    engine: WaitlistEngine,
    room: Store,
    table: Table,
}

async fn room_with_feed(feed: ChangeFeed) -> Room {
    let store = Arc::new(InMemoryStore::with_feed(feed));
    let engine = WaitlistEngine::new(store.clone());
    let room = engine
        .register_store(
            "Poker Arena",
            Coordinate {
                lat: 25.0408,
                lng: 121.568,
            },
            &["1/3".to_string(), "2/5".to_string()],
        )
        .await
        .unwrap();
    let table = engine
        .add_table(room.id, "1/3", 9, TableStatus::Open)
        .await
        .unwrap();
    Room {
        store,
        engine,
        room,
        table,
    }
}

async fn room() -> Room {
    room_with_feed(ChangeFeed::default()).await
}

async fn check_in(r: &Room, player_id: &str, rate: &str) -> WaitlistEntry {
    r.engine
        .check_in(CheckIn {
            store_id: r.room.id,
            rate: rate.to_string(),
            player_id: player_id.to_string(),
            player_name: format!("Player {player_id}"),
            arrival_estimate_minutes: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn check_in_shows_up_once_in_the_players_view() {
    let r = room().await;
    let mut ctx = SessionContext::default();
    let mut view = StoreView::open(r.engine.clone(), r.room.id, "1/3")
        .await
        .unwrap();
    assert!(view.line().is_empty());

    let entry = check_in(&r, "p1", "1/3").await;
    check_in(&r, "p2", "2/5").await;
    view.sync(&mut ctx).await.unwrap();
    assert_eq!(view.line().len(), 1);
    assert_eq!(view.line()[0].id, entry.id);

    // A second sync with nothing new and a fresh reload both leave it unchanged.
    view.sync(&mut ctx).await.unwrap();
    view.reload().await.unwrap();
    assert_eq!(view.line().len(), 1);
    assert!(ctx.take_notices().is_empty());
}

#[tokio::test]
async fn staff_and_player_views_agree_on_the_line() {
    let r = room().await;
    let mut ctx = SessionContext::new(Locale::En);
    let mut dashboard = AdminDashboard::open(r.engine.clone(), r.room.id, "1/3")
        .await
        .unwrap();
    let mut line = StoreView::open(r.engine.clone(), r.room.id, "1/3")
        .await
        .unwrap();

    let first = check_in(&r, "p1", "1/3").await;
    let second = check_in(&r, "p2", "1/3").await;
    let third = check_in(&r, "p3", "1/3").await;
    dashboard.sync(&mut ctx).await.unwrap();
    line.sync(&mut ctx).await.unwrap();

    dashboard.call_player(first.id, &mut ctx).await.unwrap();
    r.engine.cancel(third.id).await.unwrap();
    dashboard.sync(&mut ctx).await.unwrap();
    line.sync(&mut ctx).await.unwrap();

    let waiting_on_dashboard: Vec<_> = dashboard
        .queue()
        .iter()
        .filter(|e| e.status == WaitlistStatus::Waiting)
        .map(|e| e.id)
        .collect();
    let waiting_for_players: Vec<_> = line.line().iter().map(|e| e.id).collect();
    assert_eq!(waiting_on_dashboard, vec![second.id]);
    assert_eq!(waiting_for_players, waiting_on_dashboard);

    // Staff still see the called player; players only see who is waiting.
    let snapshot = dashboard.snapshot(Utc::now());
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.waiting, 1);
    let called_row = snapshot
        .queue
        .iter()
        .find(|row| row.entry.id == first.id)
        .unwrap();
    assert_eq!(called_row.minutes_since_called, Some(0));
    assert!(!called_row.overdue);

    let notices = ctx.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, Message::PlayerCalled.text(Locale::En));
}

#[tokio::test]
async fn failed_call_reverts_the_optimistic_row() {
    let r = room().await;
    let mut ctx = SessionContext::new(Locale::En);
    let entry = check_in(&r, "p1", "1/3").await;
    let mut dashboard = AdminDashboard::open(r.engine.clone(), r.room.id, "1/3")
        .await
        .unwrap();

    r.store.set_available(false);
    assert!(dashboard.call_player(entry.id, &mut ctx).await.is_err());
    assert_eq!(dashboard.queue()[0].status, WaitlistStatus::Waiting);
    assert_eq!(dashboard.queue()[0].called_at, None);

    assert!(dashboard.adjust_seats(r.table.id, 3, &mut ctx).await.is_err());
    assert_eq!(dashboard.tables()[0].current_players, 0);

    let notices = ctx.take_notices();
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.level == NoticeLevel::Error));

    r.store.set_available(true);
    let table = dashboard.adjust_seats(r.table.id, 3, &mut ctx).await.unwrap();
    assert_eq!(table.current_players, 3);
    assert_eq!(dashboard.tables()[0].current_players, 3);
}

#[tokio::test]
async fn dashboard_arrival_stays_on_its_own_tier() {
    let r = room().await;
    let mut ctx = SessionContext::new(Locale::En);
    let low = check_in(&r, "dev-1", "1/3").await;
    let high = check_in(&r, "dev-1", "2/5").await;
    let mut dashboard = AdminDashboard::open(r.engine.clone(), r.room.id, "2/5")
        .await
        .unwrap();

    let arrived = dashboard.mark_arrived(high.id, &mut ctx).await.unwrap();
    assert_eq!(arrived.id, high.id);
    assert_eq!(dashboard.queue()[0].status, WaitlistStatus::Arrived);
    let low = r.engine.entry_by_id(low.id).await.unwrap();
    assert_eq!(low.status, WaitlistStatus::Waiting);
}

#[tokio::test]
async fn player_is_told_when_called() {
    let r = room().await;
    let mut ctx = SessionContext::new(Locale::Ja);
    check_in(&r, "p0", "1/3").await;
    let entry = check_in(&r, "p1", "1/3").await;

    let mut mine = MyEntryView::open(r.engine.clone(), entry.id, "p1")
        .await
        .unwrap();
    let snapshot = mine.snapshot();
    assert_eq!(snapshot.position, Some(2));
    assert!(!snapshot.called);

    r.engine.call(entry.id).await.unwrap();
    mine.sync(&mut ctx).await.unwrap();
    let snapshot = mine.snapshot();
    assert!(snapshot.called);
    assert_eq!(snapshot.position, None);

    let notices = ctx.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, Message::YouAreCalled.text(Locale::Ja));

    // Only the transition into "called" is announced.
    mine.sync(&mut ctx).await.unwrap();
    assert!(ctx.take_notices().is_empty());
}

#[tokio::test]
async fn player_cancels_from_their_own_view() {
    let r = room().await;
    let mut ctx = SessionContext::new(Locale::ZhCn);
    let entry = check_in(&r, "p1", "1/3").await;
    let mut mine = MyEntryView::open(r.engine.clone(), entry.id, "p1")
        .await
        .unwrap();

    let cancelled = mine.cancel(&mut ctx).await.unwrap();
    assert_eq!(cancelled.status, WaitlistStatus::Cancelled);
    assert_eq!(mine.entry().map(|e| e.status), Some(WaitlistStatus::Cancelled));
    assert_eq!(mine.snapshot().position, None);

    assert!(mine.cancel(&mut ctx).await.is_err());
    let notices = ctx.take_notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].text, Message::EntryCancelled.text(Locale::ZhCn));
    assert_eq!(notices[1].level, NoticeLevel::Error);
}

#[tokio::test]
async fn someone_elses_entry_cannot_be_opened() {
    let r = room().await;
    let entry = check_in(&r, "p1", "1/3").await;
    assert!(MyEntryView::open(r.engine.clone(), entry.id, "p2").await.is_err());
}

#[tokio::test]
async fn lagging_view_reloads_and_says_so() {
    let r = room_with_feed(ChangeFeed::new(2)).await;
    let mut ctx = SessionContext::new(Locale::En);
    let mut view = StoreView::open(r.engine.clone(), r.room.id, "1/3")
        .await
        .unwrap();
    for player in ["p1", "p2", "p3", "p4", "p5"] {
        check_in(&r, player, "1/3").await;
    }

    view.sync(&mut ctx).await.unwrap();
    assert_eq!(view.line().len(), 5);
    let positions: Vec<_> = view.snapshot().line.iter().map(|row| row.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    let notices = ctx.take_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].text, Message::ViewReloaded.text(Locale::En));
}

#[tokio::test]
async fn map_light_follows_the_tables() {
    let r = room().await;
    let mut ctx = SessionContext::default();
    let mut map = MapView::open(r.engine.clone()).await.unwrap();
    assert_eq!(map.snapshot()[0].signal, SignalStatus::Green);

    r.engine.adjust_seats(r.table.id, 9).await.unwrap();
    map.sync(&mut ctx).await.unwrap();
    assert_eq!(map.snapshot()[0].signal, SignalStatus::Yellow);

    for player in ["p1", "p2", "p3", "p4"] {
        check_in(&r, player, "1/3").await;
    }
    map.sync(&mut ctx).await.unwrap();
    let signal = &map.snapshot()[0];
    assert_eq!(signal.signal, SignalStatus::Red);
    assert_eq!(signal.waiting, 4);
    assert_eq!(signal.available_seats, 0);
}
