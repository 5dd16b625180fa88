use std::path::PathBuf;

use crate::auth::jwt::JwtConfig;
use crate::ws::registry::DEFAULT_OUTBOUND_BUFFER;

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
    /// Time allowed for background tasks to stop after the listener closes (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Directory uploaded scene files are written under (default: `data`).
    pub storage_root: PathBuf,
    /// Maximum upload size in bytes (default: 100 MiB).
    pub max_upload_bytes: usize,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// Real-time annotation channel settings.
    pub realtime: RealtimeConfig,
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
    /// | `STORAGE_ROOT`         | `data`                     |
    /// | `MAX_UPLOAD_MB`        | `100`                      |
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

        let storage_root =
            PathBuf::from(std::env::var("STORAGE_ROOT").unwrap_or_else(|_| "data".into()));

        let max_upload_mb: usize = std::env::var("MAX_UPLOAD_MB")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("MAX_UPLOAD_MB must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            storage_root,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            jwt: JwtConfig::from_env(),
            realtime: RealtimeConfig::from_env(),
        }
    }
}

/// Settings for the real-time annotation channel.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Require a valid access token on the WebSocket upgrade.
    pub require_auth: bool,
    /// Frames a connection may have queued before it is treated as stalled
    /// and dropped.
    pub outbound_buffer: usize,
    /// Interval between heartbeat pings, in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            heartbeat_interval_secs: 30,
        }
    }
}

impl RealtimeConfig {
    /// | Env Var              | Default |
    /// |----------------------|---------|
    /// | `WS_REQUIRE_AUTH`    | `true`  |
    /// | `WS_OUTBOUND_BUFFER` | `32`    |
    /// | `WS_HEARTBEAT_SECS`  | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let require_auth = match std::env::var("WS_REQUIRE_AUTH") {
            Ok(v) => parse_bool(&v).expect("WS_REQUIRE_AUTH must be true or false"),
            Err(_) => defaults.require_auth,
        };

        let outbound_buffer: usize = std::env::var("WS_OUTBOUND_BUFFER")
            .map(|v| v.parse().expect("WS_OUTBOUND_BUFFER must be a valid usize"))
            .unwrap_or(defaults.outbound_buffer);
        assert!(outbound_buffer > 0, "WS_OUTBOUND_BUFFER must be at least 1");

        let heartbeat_interval_secs: u64 = std::env::var("WS_HEARTBEAT_SECS")
            .map(|v| v.parse().expect("WS_HEARTBEAT_SECS must be a valid u64"))
            .unwrap_or(defaults.heartbeat_interval_secs);
        assert!(heartbeat_interval_secs > 0, "WS_HEARTBEAT_SECS must be at least 1");

        Self {
            require_auth,
            outbound_buffer,
            heartbeat_interval_secs,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn realtime_defaults_require_auth() {
        let config = RealtimeConfig::default();
        assert!(config.require_auth);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.heartbeat_interval_secs, 30);
    }
}
