//! Project configuration (`ilbridge.toml`)
//!
//! ```toml
//! [rewrite]
//! verify = true
//!
//! [rewrite.worker_factory]
//! declaring_type = "Runtime.Workers.WorkerHost"
//! method = "GetWorker"
//!
//! [glue]
//! description = "Demo service"
//! version = "1.4.0"
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::glue::GlueConfig;
use crate::rewrite::RewriteConfig;

/// Default configuration file name
pub const CONFIG_FILE: &str = "ilbridge.toml";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Rewrite pass settings
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Glue generation settings
    #[serde(default)]
    pub glue: GlueConfig,
}

impl BridgeConfig {
    /// Parse a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load `ilbridge.toml` from `dir`, or the defaults if there is none
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }
}
