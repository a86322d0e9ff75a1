//! Native glue generation
//!
//! Produces the C translation unit that links the AOT-compiled program into
//! a standalone executable. The unit has three sections, always in this
//! order:
//!
//! 1. **Imports**: the exported callback targets and a handle accessor, so
//!    native code can resolve the handles the callback rewrite assigned.
//! 2. **Static init**: one call per static storage accessor from the static
//!    map.
//! 3. **Entry point**: `main`, forwarding to the runtime.
//!
//! # Example
//!
//! ```ignore
//! use ilbridge_engine::glue::{GlueConfig, GlueGenerator};
//!
//! GlueGenerator::new(GlueConfig::new().with_version("1.0"))
//!     .exports(File::open("exports.json")?)
//!     .static_map(File::open("map.xml")?)
//!     .output(File::create("glue.c")?)
//!     .generate()?;
//! ```

pub mod config;
pub mod entry_point;
pub mod exports;
pub mod imports;
pub mod static_init;
pub mod static_map;

use std::io::{Read, Write};

use thiserror::Error;

pub use config::GlueConfig;
pub use exports::{parse_exports, ExportRecord};
pub use static_init::static_base_stubs;
pub use static_map::parse_static_map;

/// Glue generation errors
#[derive(Debug, Error)]
pub enum GlueError {
    /// A required input or the output was not supplied
    #[error("Missing {0}")]
    MissingInput(&'static str),

    /// Reading an input or writing the output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export list is not valid JSON
    #[error("Invalid export list JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The export list has the wrong shape
    #[error("Malformed export list{}: {reason}", .index.map(|i| format!(" (record {})", i)).unwrap_or_default())]
    MalformedExports {
        /// Offending record, if the problem is in one record
        index: Option<usize>,
        /// What is wrong
        reason: String,
    },

    /// A signature template without exactly one placeholder
    #[error("Signature of export '{name}' must contain '{{0}}' exactly once, found {count}: {signature}")]
    Placeholder {
        /// Export name
        name: String,
        /// The template
        signature: String,
        /// Placeholders found
        count: usize,
    },

    /// The static map is not well-formed XML
    #[error("Invalid static map XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The static map has the wrong shape
    #[error("Malformed static map: {0}")]
    MalformedMap(String),

    /// Formatting the output failed
    #[error("Failed to format output: {0}")]
    Format(#[from] std::fmt::Error),
}

/// What a generation run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlueSummary {
    /// Exports in the handle table
    pub exports: usize,
    /// Static storage accessors called by the initializer
    pub static_bases: usize,
    /// Bytes written
    pub bytes: usize,
}

/// Render the complete translation unit
pub fn render(exports: &[ExportRecord], stubs: &[String], config: &GlueConfig) -> Result<String, GlueError> {
    let mut out = String::new();
    imports::emit_imports(&mut out, exports, config)?;
    static_init::emit_static_init(&mut out, stubs, config)?;
    entry_point::emit_entry_point(&mut out, config)?;
    Ok(out)
}

/// Stream-based front end: reads the export list and static map, writes the
/// translation unit.
///
/// Nothing is written unless generation succeeds.
pub struct GlueGenerator<'a> {
    config: GlueConfig,
    exports: Option<Box<dyn Read + 'a>>,
    static_map: Option<Box<dyn Read + 'a>>,
    output: Option<Box<dyn Write + 'a>>,
}

impl<'a> GlueGenerator<'a> {
    /// Create a generator with no inputs attached
    pub fn new(config: GlueConfig) -> Self {
        Self {
            config,
            exports: None,
            static_map: None,
            output: None,
        }
    }

    /// Attach the export list (JSON)
    pub fn exports(mut self, reader: impl Read + 'a) -> Self {
        self.exports = Some(Box::new(reader));
        self
    }

    /// Attach the static map (XML)
    pub fn static_map(mut self, reader: impl Read + 'a) -> Self {
        self.static_map = Some(Box::new(reader));
        self
    }

    /// Attach the output sink
    pub fn output(mut self, writer: impl Write + 'a) -> Self {
        self.output = Some(Box::new(writer));
        self
    }

    /// Read both inputs, render, and write the unit
    pub fn generate(self) -> Result<GlueSummary, GlueError> {
        let mut exports_in = self.exports.ok_or(GlueError::MissingInput("export list"))?;
        let mut map_in = self.static_map.ok_or(GlueError::MissingInput("static map"))?;
        let mut output = self.output.ok_or(GlueError::MissingInput("output"))?;

        let mut json = String::new();
        exports_in.read_to_string(&mut json)?;
        let exports = parse_exports(&json)?;

        let mut xml = String::new();
        map_in.read_to_string(&mut xml)?;
        let stubs = static_base_stubs(parse_static_map(&xml)?);

        let unit = render(&exports, &stubs, &self.config)?;
        output.write_all(unit.as_bytes())?;
        output.flush()?;

        let summary = GlueSummary {
            exports: exports.len(),
            static_bases: stubs.len(),
            bytes: unit.len(),
        };
        tracing::info!(
            exports = summary.exports,
            static_bases = summary.static_bases,
            bytes = summary.bytes,
            "generated native glue"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORTS: &str = r#"[
        { "name": "Method1", "signature": "void {0}()" },
        { "name": "Method2", "signature": "void {0}()" }
    ]"#;

    const MAP: &str = r#"<ObjectNodes>
        <Node Name="__GetGCStaticBase_X" />
        <Node Name="__GetNonGCStaticBase_X" />
        <Node Name="__VirtualCall_X" />
    </ObjectNodes>"#;

    #[test]
    fn test_sections_in_order() {
        let mut out = Vec::new();
        let summary = GlueGenerator::new(GlueConfig::new().with_version("1.0"))
            .exports(EXPORTS.as_bytes())
            .static_map(MAP.as_bytes())
            .output(&mut out)
            .generate()
            .unwrap();
        assert_eq!(summary.exports, 2);
        assert_eq!(summary.static_bases, 2);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(summary.bytes, text.len());
        let imports = text.find("/* ilbridge: callback imports */").unwrap();
        let statics = text.find("/* ilbridge: static storage initialization */").unwrap();
        let entry = text.find("/* ilbridge: entry point */").unwrap();
        assert!(imports < statics && statics < entry);
        assert!(text.find("return table[handle];").unwrap() < statics);
        assert!(text.find("__GetNonGCStaticBase_X();").unwrap() < entry);
        assert!(text.contains("ilbridge_runtime_set_version(\"1.0\");"));
    }

    #[test]
    fn test_missing_inputs() {
        let err = GlueGenerator::new(GlueConfig::new())
            .static_map(MAP.as_bytes())
            .output(Vec::new())
            .generate()
            .unwrap_err();
        assert!(matches!(err, GlueError::MissingInput("export list")));

        let err = GlueGenerator::new(GlueConfig::new())
            .exports(EXPORTS.as_bytes())
            .output(Vec::new())
            .generate()
            .unwrap_err();
        assert!(matches!(err, GlueError::MissingInput("static map")));

        let err = GlueGenerator::new(GlueConfig::new())
            .exports(EXPORTS.as_bytes())
            .static_map(MAP.as_bytes())
            .generate()
            .unwrap_err();
        assert!(matches!(err, GlueError::MissingInput("output")));
    }

    #[test]
    fn test_no_partial_output() {
        let mut out = Vec::new();
        let err = GlueGenerator::new(GlueConfig::new())
            .exports(EXPORTS.as_bytes())
            .static_map("<Wrong/>".as_bytes())
            .output(&mut out)
            .generate()
            .unwrap_err();
        assert!(matches!(err, GlueError::MalformedMap(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = GlueError::MalformedExports {
            index: Some(3),
            reason: "missing or non-string field 'name'".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed export list (record 3): missing or non-string field 'name'");

        let err = GlueError::Placeholder {
            name: "A".to_string(),
            signature: "void A()".to_string(),
            count: 0,
        };
        assert_eq!(
            err.to_string(),
            "Signature of export 'A' must contain '{0}' exactly once, found 0: void A()"
        );
    }
}
