use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;

pub async fn setup_database(
    db_url: &str,
    timeout: Duration,
) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(db_url);
    options
        .connect_timeout(timeout)
        .acquire_timeout(timeout);

    let db = Database::connect(options)
        .await
        .context("Cannot connect to db")?;
    Migrator::up(&db, None)
        .await
        .context("Cannot run migrations")?;

    Ok(db)
}
