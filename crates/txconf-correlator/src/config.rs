use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration of the correlator service.
///
/// Every field has a default except `chaincode_name`, which must be set
/// before [`CorrelatorConfig::validate`] passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Chaincode whose events are subscribed to.
    pub chaincode_name: String,
    /// Bound on the number of cached block headers.
    pub cache_capacity: usize,
    /// Output file for confirmation records.
    pub output_path: PathBuf,
    /// Rename the output with a capture-time prefix on shutdown.
    pub rotate_on_shutdown: bool,
    /// Seconds between status reports; 0 disables the reporter.
    pub status_interval_secs: u64,
    /// Fallback wake-up interval of the correlator and evictor, in
    /// milliseconds. Both also wake on every table change.
    pub tick_interval_ms: u64,
    /// Where to persist stream checkpoints. Volatile when unset.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            chaincode_name: String::new(),
            cache_capacity: 1000,
            output_path: PathBuf::from("confirmations.log"),
            rotate_on_shutdown: false,
            status_interval_secs: 30,
            tick_interval_ms: 250,
            checkpoint_path: None,
        }
    }
}

impl CorrelatorConfig {
    /// Default configuration for the given chaincode.
    pub fn for_chaincode(name: impl Into<String>) -> Self {
        Self {
            chaincode_name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the invariants the service relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chaincode_name.trim().is_empty() {
            return Err(ConfigError::Invalid("chaincode_name must be set".into()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1".into()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_path must be set".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The status report interval, or `None` when reporting is disabled.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}
