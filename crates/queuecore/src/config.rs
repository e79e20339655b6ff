// Config is a central place for runtime configuration.
// It loads values from environment variables and gives callers a typed,
// validated struct instead of raw strings everywhere.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub database_url: String,
    pub table_prefix: String,
    pub lease_window_secs: i64,
    pub worker_id: String,
    pub queue: String,
    pub admin_addr: Option<String>,
    pub migrate_on_startup: bool,
}

impl QueueConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let table_prefix =
            env_or_fallback("QUEUE_TABLE_PREFIX", "TABLE_PREFIX").unwrap_or_else(|| "ql".into());
        if !is_valid_prefix(&table_prefix) {
            anyhow::bail!("QUEUE_TABLE_PREFIX must match [a-z_][a-z0-9_]*, got {table_prefix:?}");
        }

        let lease_window_secs = env_or_fallback("QUEUE_LEASE_WINDOW_SECS", "LEASE_WINDOW_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);
        if lease_window_secs <= 0 {
            anyhow::bail!("QUEUE_LEASE_WINDOW_SECS must be positive");
        }

        let worker_id = env_or_fallback("QUEUE_WORKER_ID", "WORKER_ID")
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "worker-1".to_string());

        let queue =
            env_or_fallback("QUEUE_NAME", "QUEUE").unwrap_or_else(|| "default".to_string());

        let admin_addr =
            env_or_fallback("QUEUE_ADMIN_ADDR", "ADMIN_ADDR").and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("QUEUE_MIGRATE_ON_STARTUP").unwrap_or(false);

        Ok(Self {
            database_url,
            table_prefix,
            lease_window_secs,
            worker_id,
            queue,
            admin_addr,
            migrate_on_startup,
        })
    }

    pub fn running_table(&self) -> String {
        format!("{}_jobs", self.table_prefix)
    }

    pub fn result_table(&self) -> String {
        format!("{}_results", self.table_prefix)
    }
}

fn is_valid_prefix(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
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
