//! Encoder configuration
//!
//! # Example config
//!
//! ```toml
//! max_depth = 96
//! batch_size = 500
//!
//! [policy]
//! import_by_name = ["sys"]
//!
//! [policy.namespaces]
//! builtins = "opaque"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::ClassificationPolicy;

/// Default bound on nested saves.
///
/// One level costs several KiB of stack in unoptimized builds; 128 levels
/// fit a default 2 MiB spawned thread. Raise it only on a larger stack.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default number of items per `APPENDS`/`SETITEMS`/`ADDITEMS` batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    /// Maximum nesting of values before giving up.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Container items emitted per batch instruction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Classification tables; the shipped policy when absent.
    #[serde(default)]
    pub policy: ClassificationPolicy,
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            policy: ClassificationPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl EncoderConfig {
    /// Parse and validate a config from TOML text.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Validate constraints the TOML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        self.policy.validate()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generate a default config file with comments.
    pub fn default_toml() -> String {
        format!(
            "# deeppickle encoder configuration\n\
             \n\
             # Maximum nesting of values before giving up.\n\
             max_depth = {DEFAULT_MAX_DEPTH}\n\
             \n\
             # Container items emitted per batch instruction.\n\
             batch_size = {DEFAULT_BATCH_SIZE}\n\
             \n\
             # Omit [policy] to use the shipped classification tables.\n"
        )
    }
}
