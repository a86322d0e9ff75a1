//! Glue generation settings, loaded from `[glue]` in `ilbridge.toml`.

use serde::{Deserialize, Serialize};

/// Symbol names and runtime metadata for the generated C unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlueConfig {
    /// Handle → function pointer accessor (default: "ilbridge_get_callback")
    pub accessor: String,
    /// Static storage initializer (default: "ilbridge_initialize_statics")
    pub initializer: String,
    /// Runtime entry point `main` forwards to (default: "ilbridge_runtime_main")
    pub runtime_main: String,
    /// Runtime setter for the program description
    pub description_setter: String,
    /// Runtime setter for the program version
    pub version_setter: String,
    /// Program description; empty means the setter is not called
    pub description: String,
    /// Program version; empty means the setter is not called
    pub version: String,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            accessor: "ilbridge_get_callback".to_string(),
            initializer: "ilbridge_initialize_statics".to_string(),
            runtime_main: "ilbridge_runtime_main".to_string(),
            description_setter: "ilbridge_runtime_set_description".to_string(),
            version_setter: "ilbridge_runtime_set_version".to_string(),
            description: String::new(),
            version: String::new(),
        }
    }
}

impl GlueConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the program description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the program version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}
