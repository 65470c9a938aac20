use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{RequestLocale, reply};
use crate::auth::AdminPrincipal;
use crate::context::Message;
use crate::engine::ScanOutcome;
use crate::error::Result;
use crate::model::{Coordinate, EntryId, StoreId, TableId, TableStatus};
use crate::projection::AdminDashboard;
use crate::router::AppState;
use crate::store::TablePatch;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stores", post(register_store))
        .route("/stores/{store_id}/dashboard", get(dashboard))
        .route("/stores/{store_id}/walk-ins", post(add_walk_in))
        .route("/stores/{store_id}/scan", post(scan))
        .route("/stores/{store_id}/tables", post(add_table))
        .route(
            "/stores/{store_id}/rates",
            get(rate_stats)
                .post(add_rate)
                .put(rename_rate)
                .delete(delete_rate),
        )
        .route("/entries/{entry_id}/call", post(call))
        .route("/entries/{entry_id}/arrive", post(mark_arrived))
        .route("/entries/{entry_id}/seat", post(seat))
        .route("/entries/{entry_id}/cancel", post(cancel))
        .route("/tables/{table_id}", patch(edit_table).delete(delete_table))
        .route("/tables/{table_id}/players", post(adjust_players))
        .route("/overdue", get(overdue))
}

#[derive(Deserialize)]
pub struct StoreForm {
    pub name: String,
    pub location: Coordinate,
    #[serde(default)]
    pub rates: Vec<String>,
}

#[derive(Deserialize)]
pub struct RateQuery {
    pub rate: String,
}

#[derive(Deserialize)]
pub struct WalkInForm {
    pub rate: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct ScanForm {
    pub rate: String,
    pub uri: String,
}

#[derive(Deserialize)]
pub struct SeatForm {
    /// Seats at the first table with room when absent.
    #[serde(default)]
    pub table_id: Option<TableId>,
}

#[derive(Deserialize)]
pub struct TableForm {
    pub rate: String,
    pub max_seats: u32,
    #[serde(default = "open")]
    pub status: TableStatus,
}

fn open() -> TableStatus {
    TableStatus::Open
}

#[derive(Deserialize)]
pub struct PlayersForm {
    pub delta: i32,
}

#[derive(Deserialize)]
pub struct AmountForm {
    pub amount: String,
}

#[derive(Deserialize)]
pub struct RenameForm {
    pub from: String,
    pub to: String,
}

async fn register_store(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Json(form): Json<StoreForm>,
) -> Result<impl IntoResponse> {
    let store = state
        .engine
        .register_store(&form.name, form.location, &form.rates)
        .await?;
    Ok((StatusCode::CREATED, reply(store, &mut locale.session())))
}

async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Query(RateQuery { rate }): Query<RateQuery>,
) -> Result<impl IntoResponse> {
    let dashboard = AdminDashboard::open(state.engine, store_id, rate).await?;
    Ok(reply(dashboard.snapshot(Utc::now()), &mut locale.session()))
}

async fn add_walk_in(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Json(form): Json<WalkInForm>,
) -> Result<impl IntoResponse> {
    let entry = state
        .engine
        .add_walk_in(store_id, &form.rate, &form.name)
        .await?;
    let mut ctx = locale.session();
    ctx.success(Message::CheckedIn);
    Ok((StatusCode::CREATED, reply(entry, &mut ctx)))
}

async fn scan(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Json(form): Json<ScanForm>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .engine
        .scan_player(store_id, &form.rate, &form.uri)
        .await?;
    let mut ctx = locale.session();
    ctx.success(match outcome {
        ScanOutcome::Arrived(_) => Message::PlayerArrived,
        ScanOutcome::CheckedIn(_) => Message::CheckedIn,
    });
    Ok(reply(outcome, &mut ctx))
}

async fn call(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
) -> Result<impl IntoResponse> {
    let entry = state.engine.call(entry_id).await?;
    let mut ctx = locale.session();
    ctx.success(Message::PlayerCalled);
    Ok(reply(entry, &mut ctx))
}

async fn mark_arrived(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
) -> Result<impl IntoResponse> {
    let entry = state.engine.arrive(entry_id).await?;
    let mut ctx = locale.session();
    ctx.success(Message::PlayerArrived);
    Ok(reply(entry, &mut ctx))
}

async fn seat(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
    Json(form): Json<SeatForm>,
) -> Result<impl IntoResponse> {
    let (entry, table) = match form.table_id {
        Some(table_id) => state.engine.seat(entry_id, table_id).await?,
        None => state.engine.seat_anywhere(entry_id).await?,
    };
    let mut ctx = locale.session();
    ctx.success(Message::PlayerSeated);
    Ok(reply(json!({ "entry": entry, "table": table }), &mut ctx))
}

async fn cancel(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
) -> Result<impl IntoResponse> {
    let entry = state.engine.cancel(entry_id).await?;
    let mut ctx = locale.session();
    ctx.success(Message::EntryCancelled);
    Ok(reply(entry, &mut ctx))
}

async fn add_table(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Json(form): Json<TableForm>,
) -> Result<impl IntoResponse> {
    let table = state
        .engine
        .add_table(store_id, &form.rate, form.max_seats, form.status)
        .await?;
    Ok((StatusCode::CREATED, reply(table, &mut locale.session())))
}

async fn edit_table(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(table_id): Path<TableId>,
    Json(patch): Json<TablePatch>,
) -> Result<impl IntoResponse> {
    let table = state.engine.edit_table(table_id, patch).await?;
    Ok(reply(table, &mut locale.session()))
}

async fn delete_table(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(table_id): Path<TableId>,
) -> Result<impl IntoResponse> {
    let table = state.engine.delete_table(table_id).await?;
    Ok(reply(table, &mut locale.session()))
}

async fn adjust_players(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(table_id): Path<TableId>,
    Json(PlayersForm { delta }): Json<PlayersForm>,
) -> Result<impl IntoResponse> {
    let table = state.engine.adjust_seats(table_id, delta).await?;
    let mut ctx = locale.session();
    ctx.success(Message::SeatsUpdated);
    Ok(reply(table, &mut ctx))
}

async fn rate_stats(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
) -> Result<impl IntoResponse> {
    let stats = state.engine.rate_stats(store_id).await?;
    Ok(reply(stats, &mut locale.session()))
}

async fn add_rate(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Json(AmountForm { amount }): Json<AmountForm>,
) -> Result<impl IntoResponse> {
    let store = state.engine.add_rate(store_id, &amount).await?;
    Ok((StatusCode::CREATED, reply(store, &mut locale.session())))
}

async fn rename_rate(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Json(RenameForm { from, to }): Json<RenameForm>,
) -> Result<impl IntoResponse> {
    let store = state.engine.rename_rate(store_id, &from, &to).await?;
    Ok(reply(store, &mut locale.session()))
}

/// Rate labels contain `/`, so the tier is named in the query string.
async fn delete_rate(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Query(RateQuery { rate }): Query<RateQuery>,
) -> Result<impl IntoResponse> {
    let store = state.engine.delete_rate(store_id, &rate).await?;
    Ok(reply(store, &mut locale.session()))
}

async fn overdue(
    State(state): State<AppState>,
    _admin: AdminPrincipal,
    locale: RequestLocale,
) -> Result<impl IntoResponse> {
    let entries = state.engine.overdue_calls(Utc::now()).await?;
    Ok(reply(entries, &mut locale.session()))
}
