//! Configuration system for Beacon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $BEACON_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/beacon/config.toml
//!   3. ~/.config/beacon/config.toml

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Default announce/lookup window in milliseconds.
pub const DEFAULT_TIMESLOT_MS: u64 = 2500;

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Bind address for the DHT socket and both API listeners. Unset = all interfaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<IpAddr>,
    /// UDP port of the DHT participant. Also the port self-announces advertise.
    pub dht_port: u16,
    /// Known DHT participants (`host:port`) used to join the overlay.
    pub dht_bootstrap: Vec<String>,
    /// Upper bound on announce tables a node stores for other peers.
    #[serde(alias = "dht_maxTables")]
    pub dht_max_tables: usize,
    /// WebSocket API port. 0 = OS-assigned.
    pub api_port: u16,
    /// HTTP API port. Unset disables the HTTP transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_port_http: Option<u16>,
    /// Announce/lookup window in milliseconds.
    pub timeslot: u64,
    /// Reserved. Parsed and carried, never consulted: freshness comes from
    /// window rotation alone.
    #[serde(alias = "cache_maxAge", skip_serializing_if = "Option::is_none")]
    pub cache_max_age: Option<u64>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            host: None,
            dht_port: 20001,
            dht_bootstrap: Vec::new(),
            dht_max_tables: 1000,
            api_port: 30001,
            api_port_http: None,
            timeslot: DEFAULT_TIMESLOT_MS,
            cache_max_age: None,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("beacon")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BeaconConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            BeaconConfig::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("BEACON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BeaconConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeslot == 0 {
            return Err(ConfigError::Invalid("timeslot must be greater than zero"));
        }
        Ok(())
    }

    /// Apply BEACON_* overrides. `lookup` resolves a variable name; the
    /// loader passes the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ip) = lookup("BEACON_HOST").and_then(|v| v.parse().ok()) {
            self.host = Some(ip);
        }
        if let Some(p) = lookup("BEACON_DHT_PORT").and_then(|v| v.parse().ok()) {
            self.dht_port = p;
        }
        if let Some(v) = lookup("BEACON_DHT_BOOTSTRAP") {
            self.dht_bootstrap = parse_bootstrap(&v);
        }
        if let Some(n) = lookup("BEACON_DHT_MAX_TABLES").and_then(|v| v.parse().ok()) {
            self.dht_max_tables = n;
        }
        if let Some(p) = lookup("BEACON_API_PORT").and_then(|v| v.parse().ok()) {
            self.api_port = p;
        }
        if let Some(p) = lookup("BEACON_API_PORT_HTTP").and_then(|v| v.parse().ok()) {
            self.api_port_http = Some(p);
        }
        if let Some(ms) = lookup("BEACON_TIMESLOT").and_then(|v| v.parse().ok()) {
            self.timeslot = ms;
        }
        if let Some(ms) = lookup("BEACON_CACHE_MAX_AGE").and_then(|v| v.parse().ok()) {
            self.cache_max_age = Some(ms);
        }
    }
}

/// Split a comma-separated bootstrap list, dropping empty entries.
pub fn parse_bootstrap(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}
