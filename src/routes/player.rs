use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use super::{RequestLocale, reply};
use crate::auth::PlayerPrincipal;
use crate::context::Message;
use crate::engine::CheckIn;
use crate::error::{Result, WaitlistError};
use crate::identity::PlayerIdentity;
use crate::model::{EntryId, StoreId, WaitlistStatus};
use crate::projection::{MapView, StoreView};
use crate::router::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stores", get(stores))
        .route("/stores/{store_id}/line", get(line))
        .route("/checkin", post(check_in))
        .route("/entries/{entry_id}", get(my_entry))
        .route("/entries/{entry_id}/cancel", post(cancel))
        .route("/me/qr", get(my_qr))
}

#[derive(Deserialize)]
pub struct RateQuery {
    pub rate: String,
}

/// Check-in form. The player id comes from the request principal, never the body.
#[derive(Deserialize)]
pub struct CheckInForm {
    pub store_id: StoreId,
    pub rate: String,
    pub player_name: String,
    #[serde(default)]
    pub arrival_estimate_minutes: Option<u32>,
}

#[derive(Deserialize)]
pub struct QrQuery {
    pub name: Option<String>,
}

async fn stores(
    State(state): State<AppState>,
    _player: PlayerPrincipal,
    locale: RequestLocale,
) -> Result<impl IntoResponse> {
    let view = MapView::open(state.engine).await?;
    Ok(reply(view.snapshot(), &mut locale.session()))
}

async fn line(
    State(state): State<AppState>,
    _player: PlayerPrincipal,
    locale: RequestLocale,
    Path(store_id): Path<StoreId>,
    Query(RateQuery { rate }): Query<RateQuery>,
) -> Result<impl IntoResponse> {
    let view = StoreView::open(state.engine, store_id, rate).await?;
    Ok(reply(view.snapshot(), &mut locale.session()))
}

async fn check_in(
    State(state): State<AppState>,
    PlayerPrincipal(player_id): PlayerPrincipal,
    locale: RequestLocale,
    Json(form): Json<CheckInForm>,
) -> Result<impl IntoResponse> {
    let mut ctx = locale.session();
    let entry = state
        .engine
        .check_in(CheckIn {
            store_id: form.store_id,
            rate: form.rate,
            player_id,
            player_name: form.player_name,
            arrival_estimate_minutes: form.arrival_estimate_minutes,
        })
        .await?;
    ctx.success(Message::CheckedIn);
    Ok((StatusCode::CREATED, reply(entry, &mut ctx)))
}

async fn my_entry(
    State(state): State<AppState>,
    PlayerPrincipal(player_id): PlayerPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
) -> Result<impl IntoResponse> {
    let status = state.engine.player_status(entry_id).await?;
    if status.entry.player_id != player_id {
        return Err(WaitlistError::not_found("waitlist entry", entry_id));
    }
    let mut ctx = locale.session();
    if status.entry.status == WaitlistStatus::Called {
        ctx.info(Message::YouAreCalled);
    }
    Ok(reply(status, &mut ctx))
}

async fn cancel(
    State(state): State<AppState>,
    PlayerPrincipal(player_id): PlayerPrincipal,
    locale: RequestLocale,
    Path(entry_id): Path<EntryId>,
) -> Result<impl IntoResponse> {
    let entry = state.engine.cancel_own(entry_id, &player_id).await?;
    let mut ctx = locale.session();
    ctx.success(Message::EntryCancelled);
    Ok(reply(entry, &mut ctx))
}

/// The URI the player's phone renders as a QR code for the front desk.
async fn my_qr(
    PlayerPrincipal(player_id): PlayerPrincipal,
    Query(QrQuery { name }): Query<QrQuery>,
) -> impl IntoResponse {
    let identity = PlayerIdentity {
        player_id,
        display_name: name,
    };
    Json(json!({ "uri": identity.to_uri() }))
}
