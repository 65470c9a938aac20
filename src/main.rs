use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use waitlist_rs::{
    config::Config,
    database::setup_database,
    demo,
    engine::WaitlistEngine,
    feed::ChangeFeed,
    router::{AppState, create_router, shutdown_signal},
    store::{InMemoryStore, SeaOrmStore, WaitlistStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let feed = ChangeFeed::new(config.feed_capacity);
    let store: Arc<dyn WaitlistStore> = match &config.database_url {
        Some(url) if !config.use_mock_mode => {
            let db = setup_database(url, config.store_timeout).await?;
            Arc::new(SeaOrmStore::with_feed(db, feed))
        }
        _ => {
            info!("running in mock mode against the in-memory store");
            Arc::new(InMemoryStore::with_feed(feed))
        }
    };
    let engine = WaitlistEngine::new(store).with_timeout(config.store_timeout);
    if config.use_mock_mode {
        demo::seed(&engine).await.context("failed to load demo data")?;
    }
    if config.admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set; admin routes accept every request");
    }

    let monitor = tokio::spawn(watch_overdue_calls(
        engine.clone(),
        config.overdue_scan_interval,
    ));

    let state = AppState::new(engine, config.admin_token.as_deref());
    let app = create_router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(monitor.abort_handle()))
        .await?;

    if let Err(err) = monitor.await {
        if !err.is_cancelled() {
            return Err(err.into());
        }
    }
    Ok(())
}

/// Periodically logs called players who have not shown up.
async fn watch_overdue_calls(engine: WaitlistEngine, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match engine.overdue_calls(Utc::now()).await {
            Ok(overdue) => {
                for entry in overdue {
                    warn!(
                        entry_id = %entry.id,
                        store_id = %entry.store_id,
                        player = %entry.player_name,
                        called_at = ?entry.called_at,
                        "called player has not arrived"
                    );
                }
            }
            Err(err) => error!(error = %err, "overdue call scan failed"),
        }
    }
}
