//! Configuration management for ossync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Largest single object that takes part in reconciliation (100MB)
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 100 * 1024 * 1024;

/// Upper bound on concurrent transfers
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Batches above this size report per-item progress
pub const DEFAULT_PROGRESS_THRESHOLD: usize = 32;

/// Delay before the single upload retry
pub const DEFAULT_UPLOAD_RETRY_DELAY_MS: u64 = 3000;

/// Main configuration struct
///
/// Passed explicitly into the engine, executor and API client; nothing in
/// the library reads process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ==================== Remote ====================

    /// Base URL of the sync API
    pub server: String,

    /// Host accepting object uploads
    pub upload_host: String,

    /// Optional HTTP(S) proxy
    pub proxy: Option<String>,

    /// First segment of every object key
    pub namespace: String,

    /// Account the objects belong to
    pub account_id: String,

    /// Session token sent with every API call
    pub session_token: String,

    /// Identifier of this device, compared against the last remote writer
    pub device_id: String,

    // ==================== Reconciliation ====================

    /// Objects larger than this are skipped in both directions
    pub max_object_size: u64,

    /// Ignore patterns, hashed into on-disk paths
    pub ignore: Vec<String>,

    // ==================== Transfer ====================

    /// Maximum parallel transfers
    pub pool_size: usize,

    /// Item count above which progress is reported
    pub progress_threshold: usize,

    /// Upload attempts after the first failure
    pub upload_retries: u32,

    /// Fixed delay between upload attempts in milliseconds
    pub upload_retry_delay_ms: u64,

    // ==================== Timeouts ====================

    /// Object fetch timeout on startup-critical paths
    pub short_timeout_secs: u64,

    /// Object fetch timeout otherwise, and the timeout of every upload
    pub long_timeout_secs: u64,

    /// Timeout for API round-trips
    pub api_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "https://sync.example.com".to_string(),
            upload_host: "https://upload.example.com".to_string(),
            proxy: None,
            namespace: "ossync".to_string(),
            account_id: String::new(),
            session_token: String::new(),
            device_id: String::new(),

            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            ignore: Vec::new(),

            pool_size: DEFAULT_POOL_SIZE,
            progress_threshold: DEFAULT_PROGRESS_THRESHOLD,
            upload_retries: 1,
            upload_retry_delay_ms: DEFAULT_UPLOAD_RETRY_DELAY_MS,

            short_timeout_secs: 15,
            long_timeout_secs: 120,
            api_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::io("reading config", e))?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating config dir", e))?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("serializing config: {}", e)))?;
        std::fs::write(path, contents).map_err(|e| Error::io("writing config", e))?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("ossync").join("config.toml"))
            .ok_or_else(|| Error::config("could not determine config directory"))
    }

    /// Worker count for a batch of `items` transfers
    pub fn effective_pool_size(&self, items: usize) -> usize {
        self.pool_size.max(1).min(items)
    }

    /// Fixed delay between upload attempts
    pub fn upload_retry_delay(&self) -> Duration {
        Duration::from_millis(self.upload_retry_delay_ms)
    }

    pub fn short_timeout(&self) -> Duration {
        Duration::from_secs(self.short_timeout_secs)
    }

    pub fn long_timeout(&self) -> Duration {
        Duration::from_secs(self.long_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Parse a size string like "100", "100K", "100M", "100G" into bytes
    pub fn parse_size(s: &str) -> Result<u64> {
        let s = s.trim().to_uppercase();
        if s.is_empty() {
            return Ok(0);
        }

        let digits_end = s
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(s.len());
        let (num_part, suffix) = s.split_at(digits_end);

        let multiplier = match suffix.trim_end_matches('B').trim_end_matches('I') {
            "" => 1u64,
            "K" => 1024,
            "M" => 1024 * 1024,
            "G" => 1024 * 1024 * 1024,
            "T" => 1024u64 * 1024 * 1024 * 1024,
            _ => return Err(Error::config(format!("invalid size value: {}", s))),
        };

        let num: u64 = num_part
            .parse()
            .map_err(|_| Error::config(format!("invalid size value: {}", s)))?;

        num.checked_mul(multiplier)
            .ok_or_else(|| Error::config(format!("size value overflows: {}", s)))
    }
}
