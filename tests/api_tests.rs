use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use waitlist_rs::context::{Locale, Message};
use waitlist_rs::engine::{CheckIn, WaitlistEngine};
use waitlist_rs::model::{Coordinate, Store, TableStatus};
use waitlist_rs::router::{AppState, create_router};
use waitlist_rs::store::InMemoryStore;

const TOKEN: &str = "front-desk";

async fn app(admin_token: Option<&str>) -> (Router, WaitlistEngine, Store) {
    let engine = WaitlistEngine::new(Arc::new(InMemoryStore::new()));
    let room = engine
        .register_store(
            "Guild A",
            Coordinate {
                lat: 25.0478,
                lng: 121.5318,
            },
            &["1/2".to_string(), "2/5".to_string()],
        )
        .await
        .unwrap();
    engine
        .add_table(room.id, "1/2", 9, TableStatus::Open)
        .await
        .unwrap();
    let router = create_router(AppState::new(engine.clone(), admin_token));
    (router, engine, room)
}

fn player(method: Method, uri: &str, player_id: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-player-id", player_id)
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9");
    with_body(builder, body)
}

fn admin(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    with_body(builder, body)
}

fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_is_open() {
    let (app, _, _) = app(Some(TOKEN)).await;
    let (status, body) = send(&app, admin(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn player_checks_in_and_sees_their_place() {
    let (app, _, room) = app(None).await;
    let (status, body) = send(
        &app,
        player(
            Method::POST,
            "/api/player/checkin",
            "device-1",
            Some(json!({
                "store_id": room.id,
                "rate": "1/2",
                "player_name": "林小華",
                "arrival_estimate_minutes": 30
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["player_id"], "device-1");
    assert_eq!(body["data"]["status"], "waiting");
    assert_eq!(body["notices"][0]["text"], Message::CheckedIn.text(Locale::En));

    let entry_id = body["data"]["id"].as_str().unwrap().to_string();
    let (status, body) = send(
        &app,
        player(Method::GET, &format!("/api/player/entries/{entry_id}"), "device-1", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["position"], 1);
    assert_eq!(body["data"]["store_name"], "Guild A");

    let (status, _) = send(
        &app,
        player(Method::GET, &format!("/api/player/entries/{entry_id}"), "device-2", None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let cancel = format!("/api/player/entries/{entry_id}/cancel");
    let (status, _) = send(&app, player(Method::POST, &cancel, "device-2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, player(Method::POST, &cancel, "device-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
}

#[tokio::test]
async fn player_routes_need_a_player_id() {
    let (app, _, _) = app(None).await;
    let request = Request::builder()
        .uri("/api/player/stores")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn bad_check_in_is_unprocessable() {
    let (app, _, room) = app(None).await;
    let (status, body) = send(
        &app,
        player(
            Method::POST,
            "/api/player/checkin",
            "device-1",
            Some(json!({ "store_id": room.id, "rate": "10/20", "player_name": "Ann" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn admin_routes_check_the_bearer_token() {
    let (app, _, room) = app(Some(TOKEN)).await;
    let uri = format!("/api/admin/stores/{}/dashboard?rate=1%2F2", room.id);

    let (status, _) = send(&app, admin(Method::GET, &uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, admin(Method::GET, &uri, Some("guess"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, admin(Method::GET, &uri, Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rate"], "1/2");
    assert_eq!(body["data"]["total_seats"], 9);
    assert_eq!(body["data"]["signal"], "green");
}

#[tokio::test]
async fn staff_walk_in_is_called_and_seated() {
    let (app, engine, room) = app(Some(TOKEN)).await;
    let (status, body) = send(
        &app,
        admin(
            Method::POST,
            &format!("/api/admin/stores/{}/walk-ins", room.id),
            Some(TOKEN),
            Some(json!({ "rate": "1/2", "name": "張三" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let entry_id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(body["data"]["player_id"].as_str().unwrap().starts_with("manual-"));

    let (status, body) = send(
        &app,
        admin(
            Method::POST,
            &format!("/api/admin/entries/{entry_id}/call"),
            Some(TOKEN),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "called");

    let (status, body) = send(
        &app,
        admin(
            Method::POST,
            &format!("/api/admin/entries/{entry_id}/seat"),
            Some(TOKEN),
            Some(json!({})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entry"]["status"], "seated");
    assert_eq!(body["data"]["table"]["current_players"], 1);

    let signals = engine.store_signals().await.unwrap();
    assert_eq!(signals[0].available_seats, 8);
}

#[tokio::test]
async fn arrive_acts_on_the_clicked_entry() {
    let (app, engine, room) = app(None).await;
    let mut entries = Vec::new();
    for rate in ["1/2", "2/5"] {
        let entry = engine
            .check_in(CheckIn {
                store_id: room.id,
                rate: rate.to_string(),
                player_id: "dev-1".to_string(),
                player_name: "Ann".to_string(),
                arrival_estimate_minutes: None,
            })
            .await
            .unwrap();
        entries.push(entry);
    }
    let (low, high) = (&entries[0], &entries[1]);
    let uri = format!("/api/admin/entries/{}/arrive", high.id);

    let (status, body) = send(&app, admin(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], high.id.to_string());
    assert_eq!(body["data"]["status"], "arrived");
    assert_eq!(body["notices"][0]["text"], Message::PlayerArrived.text(Locale::ZhTw));
    let low = engine.entry_by_id(low.id).await.unwrap();
    assert_eq!(low.status.as_str(), "waiting");

    let (status, body) = send(&app, admin(Method::POST, &uri, None, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn tiers_in_use_cannot_be_deleted() {
    let (app, _, room) = app(None).await;
    let uri = format!("/api/admin/stores/{}/rates?rate=1%2F2", room.id);
    let (status, body) = send(&app, admin(Method::DELETE, &uri, None, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "CONFLICT");

    let uri = format!("/api/admin/stores/{}/rates?rate=2%2F5", room.id);
    let (status, body) = send(&app, admin(Method::DELETE, &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rates"], json!(["1/2"]));
}

#[tokio::test]
async fn qr_uri_round_trips_the_player() {
    let (app, _, _) = app(None).await;
    let (status, body) = send(
        &app,
        player(Method::GET, "/api/player/me/qr?name=Ann", "device-9", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uri"], "tpds://player/device%2D9?name=Ann");
}
