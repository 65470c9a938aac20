use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::model::WaitlistStatus;

pub type Result<T, E = WaitlistError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum WaitlistError {
    /// Bad input: empty name, out-of-range seat count, unknown rate.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The table had no free seat when the increment was applied.
    #[error("table {0} is full")]
    Capacity(Uuid),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot {action} an entry that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: WaitlistStatus,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// A row came back from the store in a shape we do not recognize.
    #[error("malformed row: {0}")]
    MalformedRow(String),
}

impl WaitlistError {
    pub fn validation(message: impl Into<String>) -> Self {
        WaitlistError::Validation(message.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        WaitlistError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            WaitlistError::Validation(_) => "VALIDATION_ERROR",
            WaitlistError::NotFound { .. } => "NOT_FOUND",
            WaitlistError::Capacity(_) => "CAPACITY",
            WaitlistError::Conflict(_) => "CONFLICT",
            WaitlistError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WaitlistError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            WaitlistError::WriteRejected(_) => "WRITE_REJECTED",
            WaitlistError::MalformedRow(_) => "MALFORMED_ROW",
        }
    }

    /// Text suitable for a toast or banner shown to staff or players.
    pub fn notice(&self) -> String {
        match self {
            WaitlistError::Validation(message) => message.clone(),
            WaitlistError::NotFound { kind, .. } => format!("The {kind} no longer exists."),
            WaitlistError::Capacity(_) => "That table is already full.".to_string(),
            WaitlistError::Conflict(message) => message.clone(),
            WaitlistError::InvalidTransition { action, from } => {
                format!("Cannot {action} a player who is already {from}.")
            }
            WaitlistError::StoreUnavailable(_) | WaitlistError::WriteRejected(_) => {
                "The server could not save the change. Please try again.".to_string()
            }
            WaitlistError::MalformedRow(_) => {
                "Received unexpected data from the server.".to_string()
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            WaitlistError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WaitlistError::NotFound { .. } => StatusCode::NOT_FOUND,
            WaitlistError::Capacity(_)
            | WaitlistError::Conflict(_)
            | WaitlistError::InvalidTransition { .. } => StatusCode::CONFLICT,
            WaitlistError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            WaitlistError::WriteRejected(_) => StatusCode::BAD_GATEWAY,
            WaitlistError::MalformedRow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbErr> for WaitlistError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                WaitlistError::StoreUnavailable(err.to_string())
            }
            other => WaitlistError::WriteRejected(other.to_string()),
        }
    }
}

impl IntoResponse for WaitlistError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = Json(json!({
            "error": self.code(),
            "message": self.notice(),
        }));
        (status, body).into_response()
    }
}
