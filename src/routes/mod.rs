//! JSON handlers for the player app, the staff console and the change feed.

use std::convert::Infallible;

use axum::{Json, extract::FromRequestParts, http::header::ACCEPT_LANGUAGE, http::request::Parts};
use serde::Serialize;

use crate::context::{Locale, Notice, SessionContext};

pub mod admin;
pub mod feed;
pub mod player;

/// Response envelope: the payload plus any notices raised while producing it.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    pub data: T,
    pub notices: Vec<Notice>,
}

pub fn reply<T: Serialize>(data: T, ctx: &mut SessionContext) -> Json<Reply<T>> {
    Json(Reply {
        data,
        notices: ctx.take_notices(),
    })
}

/// Locale picked from `Accept-Language`, falling back to Traditional Chinese.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLocale(pub Locale);

impl RequestLocale {
    pub fn session(self) -> SessionContext {
        SessionContext::new(self.0)
    }
}

impl<S> FromRequestParts<S> for RequestLocale
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let locale = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .map(Locale::from_accept_language)
            .unwrap_or_default();
        Ok(Self(locale))
    }
}
