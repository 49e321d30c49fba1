//! Gateway configuration – reads `~/.rover-gcs/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_types::GatewayError;
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "ROVER_GCS_CONFIG";

/// Startup configuration.  Only `mavlink_connection` reaches the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// MAVLink endpoint, e.g. `udpin:127.0.0.1:14550` or `tcpout:10.0.0.2:5760`.
    #[serde(default = "default_mavlink_connection")]
    pub mavlink_connection: String,

    /// Port for the HTTP/WebSocket facade.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// WebSocket snapshot period in milliseconds.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
}

fn default_mavlink_connection() -> String {
    "udpin:127.0.0.1:14550".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_push_interval_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mavlink_connection: default_mavlink_connection(),
            http_port: default_http_port(),
            push_interval_ms: default_push_interval_ms(),
        }
    }
}

impl Config {
    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms.max(1))
    }
}

/// `$ROVER_GCS_CONFIG` if set, otherwise `~/.rover-gcs/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover-gcs").join("config.toml")
}

/// Load the config from [`config_path`], falling back to defaults when the
/// file is absent, then apply environment overrides.
pub fn load() -> Result<Config, GatewayError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, GatewayError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        GatewayError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        GatewayError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MAVLINK_CONNECTION` | `mavlink_connection` |
/// | `ROVER_HTTP_PORT` | `http_port` |
/// | `ROVER_PUSH_INTERVAL_MS` | `push_interval_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("MAVLINK_CONNECTION")
        && !v.trim().is_empty()
    {
        cfg.mavlink_connection = v.trim().to_string();
    }
    if let Some(v) = lookup("ROVER_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Some(v) = lookup("ROVER_PUSH_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.push_interval_ms = ms;
    }
}
