//! Bridge configuration.
//!
//! TOML-based configuration with environment variable fallbacks so the same
//! binary can run from a config file in production and from env overrides in
//! development.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Upstream stream connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// WebSocket endpoint of the telemetry stream
    pub url: String,

    /// Delay between reconnection attempts in milliseconds
    pub reconnect_delay_ms: u64,

    /// Maximum number of consecutive reconnection attempts before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8090/telemetry".to_string(),
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Default per-path delivery settings, used where a mapping entry does not
/// override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionDefaults {
    pub period: u32,
    pub format: String,
    pub policy: String,
    pub min_period: u32,
}

impl Default for SubscriptionDefaults {
    fn default() -> Self {
        Self {
            period: 500,
            format: "json".to_string(),
            policy: "onchange".to_string(),
            min_period: 100,
        }
    }
}

/// Mapping table location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Path to the JSON mapping configuration file
    pub file: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            file: "config/mapping.json".to_string(),
        }
    }
}

/// Mandatory resource cache locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory of object schema JSON files used to (re)generate the cache
    pub schema_dir: String,

    /// Persisted cache snapshot, regenerated from `schema_dir` when absent
    /// or unreadable
    pub file: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema_dir: "config/objects".to_string(),
            file: "cache/mandatory_resources.json".to_string(),
        }
    }
}

/// Validation policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// When true, a failed single-resource validation suppresses the command
    /// instead of merely logging it. Template notifications always block.
    pub strict_single_resource: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            strict_single_resource: false,
        }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub subscription: SubscriptionDefaults,

    #[serde(default)]
    pub mapping: MappingConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub validation: ValidationPolicy,
}

impl BridgeConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn from_toml_file(file_path: &Path) -> Result<Self> {
        if file_path.exists() {
            let content = std::fs::read_to_string(file_path)?;
            Self::from_toml_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Load configuration with environment variable overrides applied on top.
    pub fn load(file_path: &Path) -> Result<Self> {
        let mut config = Self::from_toml_file(file_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `SIGNALBRIDGE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(url) = env::var("SIGNALBRIDGE_UPSTREAM_URL") {
            self.upstream.url = url;
        }

        if let Ok(delay) = env::var("SIGNALBRIDGE_RECONNECT_DELAY_MS") {
            if let Ok(delay) = delay.parse() {
                self.upstream.reconnect_delay_ms = delay;
            }
        }

        if let Ok(attempts) = env::var("SIGNALBRIDGE_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                self.upstream.max_reconnect_attempts = attempts;
            }
        }

        if let Ok(file) = env::var("SIGNALBRIDGE_MAPPING_FILE") {
            self.mapping.file = file;
        }

        if let Ok(dir) = env::var("SIGNALBRIDGE_SCHEMA_DIR") {
            self.cache.schema_dir = dir;
        }

        if let Ok(file) = env::var("SIGNALBRIDGE_CACHE_FILE") {
            self.cache.file = file;
        }
    }

    /// Validate the complete configuration.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.url.is_empty() {
            return Err(BridgeError::Config(
                "upstream URL cannot be empty".to_string(),
            ));
        }

        if !self.upstream.url.starts_with("ws://") && !self.upstream.url.starts_with("wss://") {
            return Err(BridgeError::Config(
                "upstream URL must start with ws:// or wss://".to_string(),
            ));
        }

        if self.upstream.reconnect_delay_ms == 0 {
            return Err(BridgeError::Config(
                "reconnect delay must be greater than 0".to_string(),
            ));
        }

        if self.mapping.file.is_empty() {
            return Err(BridgeError::Config(
                "mapping file path cannot be empty".to_string(),
            ));
        }

        if self.cache.schema_dir.is_empty() {
            return Err(BridgeError::Config(
                "schema directory cannot be empty".to_string(),
            ));
        }

        if self.subscription.min_period > self.subscription.period {
            return Err(BridgeError::Config(
                "subscription min_period cannot exceed period".to_string(),
            ));
        }

        Ok(())
    }
}
