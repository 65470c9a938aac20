use axum::{extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};

use super::AuthError;
use crate::identity::player_id_checked;
use crate::router::AppState;

pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// The staff token, held as a digest so comparisons take the same time
/// however much of a guess is right.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AdminToken([u8; 32]);

impl AdminToken {
    pub fn new(token: &str) -> Self {
        Self(Sha256::digest(token.as_bytes()).into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.0
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(..)")
    }
}

/// A player acting on their own behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPrincipal(pub String);

impl FromRequestParts<AppState> for PlayerPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let player_id = parts
            .headers
            .get(PLAYER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .ok_or(AuthError::MissingPlayer)?;
        player_id_checked(player_id).map_err(|err| AuthError::InvalidPlayer(err.notice()))?;
        Ok(Self(player_id.to_string()))
    }
}

/// Room staff. With no token configured every request is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPrincipal;

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token else {
            return Ok(Self);
        };
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;
        if expected.matches(token) {
            Ok(Self)
        } else {
            Err(AuthError::BadToken)
        }
    }
}
