use std::time::Duration;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Postgres connection string. Without it, status lives in memory only.
    pub database_url: Option<String>,
    /// Ping and inactivity sweep timing.
    pub liveness: LivenessConfig,
    /// Token settings. Without them, session access is not enforced.
    pub jwt: Option<JwtConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `DATABASE_URL`         | unset (in-memory status)   |
    ///
    /// See [`LivenessConfig::from_env`] and [`JwtConfig::from_env_optional`]
    /// for the remaining variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            liveness: LivenessConfig::from_env(),
            jwt: JwtConfig::from_env_optional(),
        }
    }
}

/// Default interval between server Ping frames.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
/// Default interval between inactivity sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Default inactivity after which a connection is evicted.
pub const DEFAULT_INACTIVITY_TIMEOUT_SECS: u64 = 600;

/// Timing for the liveness supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessConfig {
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub inactivity_timeout: Duration,
}

impl LivenessConfig {
    /// Load liveness timing from environment variables.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`    |
    /// | `SWEEP_INTERVAL_SECS`     | `300`   |
    /// | `INACTIVITY_TIMEOUT_SECS` | `600`   |
    ///
    /// # Panics
    ///
    /// Panics if a value is not a positive integer.
    pub fn from_env() -> Self {
        Self {
            heartbeat_interval: secs_from_env(
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            ),
            sweep_interval: secs_from_env("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            inactivity_timeout: secs_from_env(
                "INACTIVITY_TIMEOUT_SECS",
                DEFAULT_INACTIVITY_TIMEOUT_SECS,
            ),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            inactivity_timeout: Duration::from_secs(DEFAULT_INACTIVITY_TIMEOUT_SECS),
        }
    }
}

fn secs_from_env(var: &str, default: u64) -> Duration {
    let secs: u64 = std::env::var(var)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{var} must be a valid u64"));
    assert!(secs > 0, "{var} must be greater than zero");
    Duration::from_secs(secs)
}
