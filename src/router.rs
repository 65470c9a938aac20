use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tokio::{signal, task::AbortHandle};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::auth::AdminToken;
use crate::engine::WaitlistEngine;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
    pub engine: WaitlistEngine,
    /// `None` leaves the admin routes open.
    pub admin_token: Option<AdminToken>,
}

impl AppState {
    pub fn new(engine: WaitlistEngine, admin_token: Option<&str>) -> Self {
        Self {
            engine,
            admin_token: admin_token.map(AdminToken::new),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/player", routes::player::router())
        .nest("/api/admin", routes::admin::router())
        .route("/api/feed", get(routes::feed::feed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolves on Ctrl-C or SIGTERM and stops the background task.
pub async fn shutdown_signal(background: AbortHandle) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
    background.abort();
}
