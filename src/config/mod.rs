use std::time::Duration;

use clap::Parser;

/// Policy service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "policyd")]
#[command(about = "Access policy management service")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "POLICYD_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Postgres connection URL (optional, in-memory storage if not set)
    #[arg(long, env = "POLICYD_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minimum pooled database connections
    #[arg(long, default_value = "1", env = "POLICYD_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, default_value = "10", env = "POLICYD_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// Apply pending migrations on startup
    #[arg(long, default_value = "true", env = "POLICYD_RUN_MIGRATIONS")]
    pub run_migrations: bool,

    /// Policy cache refresh interval in seconds
    #[arg(long, default_value = "30", env = "POLICYD_CACHE_REFRESH_SECS")]
    pub cache_refresh_secs: u64,

    /// Capacity of the in-process change channel
    #[arg(long, default_value = "64", env = "POLICYD_NOTIFY_CAPACITY")]
    pub notify_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false", env = "POLICYD_LOG_JSON")]
    pub log_json: bool,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "POLICYD_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value = "30", env = "POLICYD_SHUTDOWN_TIMEOUT_SECS")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Get cache refresh interval as Duration.
    pub fn cache_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_secs.max(1))
    }

    /// Get shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Whether policies are persisted in Postgres.
    pub fn uses_database(&self) -> bool {
        self.database_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 10,
            run_migrations: true,
            cache_refresh_secs: 30,
            notify_capacity: 64,
            log_level: "info".to_string(),
            log_json: false,
            graceful_shutdown: true,
            shutdown_timeout_secs: 30,
        }
    }
}
