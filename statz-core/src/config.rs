//! Configuration for the Statz statistics system.
//!
//! Maps directly to `statz.toml`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::specification::SpecificationDef;
use crate::types::StatType;

/// Top-level Statz configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatzConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Cache sizing and diagnostics.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Durable storage settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Per-statistic regions and claims where recording is disabled.
    #[serde(default)]
    pub suppression: BTreeMap<StatType, DisabledAreas>,
    /// Additional statistic definitions.
    #[serde(default)]
    pub specifications: Vec<SpecificationDef>,
}

impl StatzConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `StatzError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::StatzError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether statistics are recorded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Cache sizing and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of lock shards; a power of two greater than one.
    #[serde(default = "default_shard_amount")]
    pub shard_amount: usize,
    /// Entities to reserve room for up front.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
    /// Log any merge taking longer than this (milliseconds).
    #[serde(default = "default_slow_merge_ms")]
    pub slow_merge_warn_ms: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            shard_amount: 64,
            initial_capacity: 256,
            slow_merge_warn_ms: 5.0,
        }
    }
}

/// Durable storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path of the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
    /// Seconds between background flushes of changed entities.
    #[serde(default = "default_flush_interval")]
    pub flush_interval_seconds: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: "statz.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
            flush_interval_seconds: 60,
        }
    }
}

/// Areas where one statistic is not recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisabledAreas {
    /// Named regions (region-protection plugin).
    #[serde(default)]
    pub regions: Vec<String>,
    /// Claim UUIDs (land-claim plugin).
    #[serde(default)]
    pub claims: Vec<String>,
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_shard_amount() -> usize { 64 }
fn default_initial_capacity() -> usize { 256 }
fn default_slow_merge_ms() -> f64 { 5.0 }
fn default_database_path() -> String { "statz.db".to_string() }
fn default_flush_interval() -> u64 { 60 }
