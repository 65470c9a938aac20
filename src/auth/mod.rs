//! Request principals for the two API surfaces.
//!
//! Players are identified by the device-issued id they send in `x-player-id`;
//! staff by the shared bearer token configured as `ADMIN_TOKEN`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

mod principal;

pub use principal::{AdminPrincipal, AdminToken, PLAYER_ID_HEADER, PlayerPrincipal};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing x-player-id header")]
    MissingPlayer,

    #[error("invalid player id: {0}")]
    InvalidPlayer(String),

    #[error("missing bearer token")]
    MissingToken,

    #[error("bearer token rejected")]
    BadToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "unauthenticated request");
        let body = Json(json!({
            "error": "UNAUTHORIZED",
            "message": self.to_string(),
        }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}
