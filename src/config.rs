//! Engine configuration
//!
//! Holds the queue bound and the feature switches that older deployments
//! ran without. Loaded from `engine.json` in the data directory when
//! present, defaults otherwise.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Default maximum number of unresolved transactions per account
pub const DEFAULT_MAX_PENDING_TRANSACTIONS: u64 = 20;

/// Default configuration file name inside the data directory
pub const CONFIG_FILE: &str = "engine.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

bitflags! {
    /// Optional engine behaviors
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EngineFeatures: u32 {
        /// Reject proposals once `max_pending_transactions` are unresolved
        const QUEUE_LIMIT = 1 << 0;
        /// Allow ranged votes and ranged rejection finalization
        const RANGED_OPERATIONS = 1 << 1;
        /// Record an implicit reject for a caller finalizing a rejection
        const IMPLICIT_REJECT_VOTE = 1 << 2;
        /// Require a supplied payload to equal a stored full payload
        const STRICT_PAYLOAD_MATCH = 1 << 3;
        /// Allow converting existing key-controlled accounts
        const ACCOUNT_MIGRATION = 1 << 4;
    }
}

impl Default for EngineFeatures {
    fn default() -> Self {
        Self::all()
    }
}

impl EngineFeatures {
    /// Human-readable name of a single feature, used in error messages
    pub fn name(self) -> &'static str {
        if self == Self::QUEUE_LIMIT {
            "queue_limit"
        } else if self == Self::RANGED_OPERATIONS {
            "ranged_operations"
        } else if self == Self::IMPLICIT_REJECT_VOTE {
            "implicit_reject_vote"
        } else if self == Self::STRICT_PAYLOAD_MATCH {
            "strict_payload_match"
        } else if self == Self::ACCOUNT_MIGRATION {
            "account_migration"
        } else {
            "unknown"
        }
    }
}

/// Engine-wide settings shared by every account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity bound for unresolved transactions per account
    pub max_pending_transactions: u64,
    /// Enabled features
    pub features: EngineFeatures,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pending_transactions: DEFAULT_MAX_PENDING_TRANSACTIONS,
            features: EngineFeatures::default(),
        }
    }
}

impl EngineConfig {
    /// Configuration matching deployments that predate the queue bound
    /// and the ranged operations
    pub fn legacy() -> Self {
        Self {
            max_pending_transactions: DEFAULT_MAX_PENDING_TRANSACTIONS,
            features: EngineFeatures::ACCOUNT_MIGRATION,
        }
    }

    /// Check whether a feature is switched on
    pub fn enabled(&self, feature: EngineFeatures) -> bool {
        self.features.contains(feature)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled(EngineFeatures::QUEUE_LIMIT) && self.max_pending_transactions == 0 {
            return Err(ConfigError::Invalid(
                "max_pending_transactions must be at least 1 when the queue limit is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `engine.json` from the data directory, or fall back to defaults
    pub fn load_or_default(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            log::debug!("Loading engine config from {:?}", path);
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
