//! Subcommand implementations

pub mod glue;
pub mod rewrite;

use std::path::Path;

use anyhow::Context;
use ilbridge_engine::BridgeConfig;

/// Load the configuration named on the command line, or discover one in the
/// current directory.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => BridgeConfig::discover(Path::new("."))
            .context("Failed to load ilbridge.toml from the current directory"),
    }
}
