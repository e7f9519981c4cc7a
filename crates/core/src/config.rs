//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Values that cannot work together
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Time limits the engine works within.
///
/// Durations are written as whole seconds in TOML:
///
/// ```toml
/// max_execution = 360
/// trigger_delay = 60
/// record_ttl = 600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard wall-clock limit of one invocation
    #[serde(with = "secs")]
    pub max_execution: Duration,

    /// Delay before a scheduled continuation fires, also the slack reserved
    /// for registering it
    #[serde(with = "secs")]
    pub trigger_delay: Duration,

    /// Lifetime of an execution record in the store
    #[serde(with = "secs")]
    pub record_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_execution: Duration::from_secs(6 * 60),
            trigger_delay: Duration::from_secs(60),
            record_ttl: Duration::from_secs(10 * 60),
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the invocation time limit.
    pub fn with_max_execution(mut self, duration: Duration) -> Self {
        self.max_execution = duration;
        self
    }

    /// Set the continuation delay.
    pub fn with_trigger_delay(mut self, duration: Duration) -> Self {
        self.trigger_delay = duration;
        self
    }

    /// Set the record lifetime.
    pub fn with_record_ttl(mut self, duration: Duration) -> Self {
        self.record_ttl = duration;
        self
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check that a record outlives one full invocation plus the delay before
    /// its continuation fires.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = self.max_execution + self.trigger_delay;
        if self.record_ttl < required {
            return Err(ConfigError::Invalid(format!(
                "record_ttl ({}s) must be at least max_execution + trigger_delay ({}s)",
                self.record_ttl.as_secs(),
                required.as_secs(),
            )));
        }
        Ok(())
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
