use anyhow::{Context, bail};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    /// Serve from the seeded in-memory store instead of the database.
    pub use_mock_mode: bool,
    pub store_timeout: Duration,
    pub admin_token: Option<String>,
    pub feed_capacity: usize,
    pub overdue_scan_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // A missing .env is fine; the variables may come from the environment.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so parsing can be tested without
    /// touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let use_mock_mode = parse_or(&lookup, "USE_MOCK_MODE", false)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if database_url.is_none() && !use_mock_mode {
            bail!("DATABASE_URL is not set and USE_MOCK_MODE is off");
        }
        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "debug".into());
        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let store_timeout = Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 10)?);
        let admin_token = lookup("ADMIN_TOKEN").filter(|token| !token.trim().is_empty());
        let feed_capacity = parse_or(&lookup, "FEED_CAPACITY", 256)?;
        let overdue_scan_interval =
            Duration::from_secs(parse_or(&lookup, "OVERDUE_SCAN_SECS", 30)?);

        if store_timeout.is_zero() {
            bail!("STORE_TIMEOUT_SECS must be positive");
        }
        if overdue_scan_interval.is_zero() {
            bail!("OVERDUE_SCAN_SECS must be positive");
        }

        Ok(Self {
            database_url,
            rust_log,
            bind_addr,
            use_mock_mode,
            store_timeout,
            admin_token,
            feed_capacity,
            overdue_scan_interval,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value {raw:?}")),
        _ => Ok(default),
    }
}
