//! # Beacon Configuration
//!
//! Layered configuration for the dispatch server.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BEACON_PORT=9000                                                   │
//! │     BEACON_DB_PATH=/var/lib/beacon/beacon.db                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     --config <path> or BEACON_CONFIG                                   │
//! │     ~/.config/beacon/beacon.toml (Linux)                               │
//! │     ~/Library/Application Support/com.beacon.queue/beacon.toml (macOS) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # beacon.toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "./beacon.db"
//! max_connections = 5
//!
//! [reconciler]
//! enabled = true
//! interval_secs = 60
//! stuck_serving_secs = 39600   # 11 hours
//! utc_offset_minutes = 480     # operating day starts at local midnight
//!
//! [events]
//! capacity = 1024
//! webhook_url = "http://display-relay.local/events"
//! webhook_max_elapsed_secs = 30
//!
//! [[counters]]
//! number = 1
//! label = "Front Desk"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, DispatchResult};

/// Largest accepted UTC offset, in minutes (±18h).
const MAX_UTC_OFFSET_MINUTES: u32 = 18 * 60;

/// Longest accepted stuck-serving timeout (7 days).
const MAX_STUCK_SERVING_SECS: u64 = 7 * 24 * 60 * 60;

// =============================================================================
// Server Settings
// =============================================================================

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address (default: 0.0.0.0 for all interfaces).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Reader pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./beacon.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Reconciler Settings
// =============================================================================

/// Staleness reconciler timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerSettings {
    /// Whether the background sweep runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// A serving ticket called longer ago than this is requeued.
    #[serde(default = "default_stuck_serving")]
    pub stuck_serving_secs: u64,

    /// Offset of the site's local time from UTC. Waiting tickets created
    /// before local midnight are expired.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    60
}

fn default_stuck_serving() -> u64 {
    11 * 60 * 60
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        ReconcilerSettings {
            enabled: true,
            interval_secs: default_interval(),
            stuck_serving_secs: default_stuck_serving(),
            utc_offset_minutes: 0,
        }
    }
}

// =============================================================================
// Event Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Events buffered per subscriber before the slowest one starts losing
    /// the oldest.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Optional HTTP endpoint receiving every event as a JSON POST.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Give up on one event after retrying this long.
    #[serde(default = "default_webhook_max_elapsed")]
    pub webhook_max_elapsed_secs: u64,
}

fn default_capacity() -> usize {
    crate::broadcast::DEFAULT_CAPACITY
}

fn default_webhook_max_elapsed() -> u64 {
    30
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            capacity: default_capacity(),
            webhook_url: None,
            webhook_max_elapsed_secs: default_webhook_max_elapsed(),
        }
    }
}

// =============================================================================
// Counter Seeds
// =============================================================================

/// A counter registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSeed {
    pub number: i64,
    pub label: String,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reconciler: ReconcilerSettings,

    #[serde(default)]
    pub events: EventSettings,

    /// Counters registered (or reactivated) at startup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<CounterSeed>,
}

impl BeaconConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else `BEACON_CONFIG`, else the
    ///    platform config dir)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DispatchResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var_os("BEACON_CONFIG").map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.server.port == 0 {
            return Err(DispatchError::InvalidConfig("server.port must not be 0".into()));
        }

        if self.database.path.as_os_str().is_empty() {
            return Err(DispatchError::InvalidConfig("database.path is required".into()));
        }

        if self.reconciler.interval_secs == 0 {
            return Err(DispatchError::InvalidConfig(
                "reconciler.interval_secs must be greater than 0".into(),
            ));
        }

        if !(1..=MAX_STUCK_SERVING_SECS).contains(&self.reconciler.stuck_serving_secs) {
            return Err(DispatchError::InvalidConfig(format!(
                "reconciler.stuck_serving_secs must be within 1..={}, got {}",
                MAX_STUCK_SERVING_SECS, self.reconciler.stuck_serving_secs
            )));
        }

        if self.reconciler.utc_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(DispatchError::InvalidConfig(format!(
                "reconciler.utc_offset_minutes must be within ±{}, got {}",
                MAX_UTC_OFFSET_MINUTES, self.reconciler.utc_offset_minutes
            )));
        }

        if self.events.capacity == 0 {
            return Err(DispatchError::InvalidConfig(
                "events.capacity must be greater than 0".into(),
            ));
        }

        if let Some(ref url) = self.events.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DispatchError::InvalidConfig(format!(
                    "events.webhook_url must start with http:// or https://, got: {}",
                    url
                )));
            }
        }

        let mut numbers = std::collections::HashSet::new();
        for seed in &self.counters {
            if seed.number <= 0 {
                return Err(DispatchError::InvalidConfig(format!(
                    "counter number must be positive, got {}",
                    seed.number
                )));
            }
            if !numbers.insert(seed.number) {
                return Err(DispatchError::InvalidConfig(format!(
                    "counter number {} configured twice",
                    seed.number
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("BEACON_BIND_ADDR") {
            self.server.bind_addr = addr;
        }

        if let Ok(port) = std::env::var("BEACON_PORT") {
            match port.parse::<u16>() {
                Ok(p) => {
                    debug!(port = p, "Overriding port from environment");
                    self.server.port = p;
                }
                Err(_) => warn!(value = %port, "Ignoring invalid BEACON_PORT"),
            }
        }

        if let Ok(path) = std::env::var("BEACON_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(url) = std::env::var("BEACON_WEBHOOK_URL") {
            self.events.webhook_url = if url.trim().is_empty() { None } else { Some(url) };
        }

        if let Ok(enabled) = std::env::var("BEACON_RECONCILER_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.reconciler.enabled = true,
                "0" | "false" | "no" | "off" => self.reconciler.enabled = false,
                _ => warn!(value = %enabled, "Ignoring invalid BEACON_RECONCILER_ENABLED"),
            }
        }

        if let Ok(offset) = std::env::var("BEACON_UTC_OFFSET_MINUTES") {
            if let Ok(minutes) = offset.parse::<i32>() {
                self.reconciler.utc_offset_minutes = minutes;
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "beacon", "queue")
            .map(|dirs| dirs.config_dir().join("beacon.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BeaconConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.reconciler.interval_secs, 60);
        assert_eq!(config.reconciler.stuck_serving_secs, 39_600);
        assert_eq!(config.events.capacity, 1024);
        assert!(config.events.webhook_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BeaconConfig::default();

        config.reconciler.interval_secs = 0;
        assert!(config.validate().is_err());
        config.reconciler.interval_secs = 60;

        config.events.webhook_url = Some("ftp://relay".to_string());
        assert!(config.validate().is_err());
        config.events.webhook_url = Some("https://relay.local/events".to_string());
        assert!(config.validate().is_ok());

        config.reconciler.utc_offset_minutes = 24 * 60;
        assert!(config.validate().is_err());
        config.reconciler.utc_offset_minutes = i32::MIN;
        assert!(config.validate().is_err());
        config.reconciler.utc_offset_minutes = -300;
        assert!(config.validate().is_ok());

        config.reconciler.stuck_serving_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.reconciler.stuck_serving_secs = 0;
        assert!(config.validate().is_err());
        config.reconciler.stuck_serving_secs = 7 * 24 * 60 * 60;
        assert!(config.validate().is_ok());

        config.counters = vec![
            CounterSeed { number: 1, label: "A".into() },
            CounterSeed { number: 1, label: "B".into() },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BeaconConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [reconciler]
            utc_offset_minutes = 480

            [[counters]]
            number = 2
            label = "Counter 2"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr, "0.0.0.0");
        assert_eq!(config.reconciler.utc_offset_minutes, 480);
        assert!(config.reconciler.enabled);
        assert_eq!(config.counters.len(), 1);
        assert_eq!(config.counters[0].label, "Counter 2");
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("beacon-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[database]\npath = \"/tmp/queue.db\"\n").unwrap();

        let config = BeaconConfig::load(Some(path.clone())).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/queue.db"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_toml_serialization() {
        let config = BeaconConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[reconciler]"));
    }
}
