//! Process configuration, read from the environment (and `.env`).

use std::time::Duration;

use jobbox_db::DbConfig;

#[derive(Clone, Debug)]
pub struct Config {
    pub db: DbConfig,
    pub broker_url: String,
    /// `None` runs workers only.
    pub http_addr: Option<String>,
    /// Zero runs the HTTP surface only.
    pub workers: usize,
    pub worker_id: String,
    pub poll_timeout: Duration,
    pub heartbeat: Duration,
    pub recent_cap: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut db = DbConfig::endpoint(env("JOBBOX_DB_ENDPOINT").unwrap_or_else(|| "mem://".to_string()));
        if let Some(namespace) = env("JOBBOX_DB_NAMESPACE") {
            db = db.with_namespace(namespace);
        }
        if let Some(database) = env("JOBBOX_DB_DATABASE") {
            db = db.with_database(database);
        }
        match (env("JOBBOX_DB_USER"), env("JOBBOX_DB_PASS")) {
            (Some(user), Some(pass)) => db = db.with_credentials(user, pass),
            (None, None) => {}
            _ => anyhow::bail!("JOBBOX_DB_USER and JOBBOX_DB_PASS must be set together"),
        }

        let broker_url = env("JOBBOX_BROKER_URL").unwrap_or_else(|| "memory://".to_string());

        let http_addr = match env("JOBBOX_HTTP_ADDR") {
            Some(addr) => normalize_optional_addr(&addr),
            None => Some("0.0.0.0:3000".to_string()),
        };

        let worker_id = env("JOBBOX_WORKER_ID")
            .or_else(|| env("HOSTNAME"))
            .unwrap_or_else(|| "worker".to_string());

        Ok(Self {
            db,
            broker_url,
            http_addr,
            workers: parse_or("JOBBOX_WORKERS", 2)?,
            worker_id,
            poll_timeout: secs_or("JOBBOX_POLL_TIMEOUT_SECS", 5)?,
            heartbeat: secs_or("JOBBOX_HEARTBEAT_SECS", 15)?,
            recent_cap: parse_or("JOBBOX_RECENT_CAP", 50)?,
        })
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}")),
        None => Ok(default),
    }
}

fn secs_or(key: &str, default: u64) -> anyhow::Result<Duration> {
    parse_secs(key, env(key).as_deref(), default)
}

/// Whole seconds, at least one. A zero pop timeout would block a Redis
/// worker forever and a zero heartbeat has no period.
fn parse_secs(key: &str, raw: Option<&str>, default: u64) -> anyhow::Result<Duration> {
    let secs = match raw {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}"))?,
        None => default,
    };
    if secs == 0 {
        anyhow::bail!("{key} must be at least 1");
    }
    Ok(Duration::from_secs(secs))
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
