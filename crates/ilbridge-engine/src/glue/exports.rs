//! Export list loading
//!
//! The AOT compiler writes one record per native-callable method:
//!
//! ```json
//! [ { "name": "App_Program__OnTick", "signature": "void {0}(int32_t)" } ]
//! ```
//!
//! Record `i` is the target of callback handle `i`.

use serde_json::Value;

use super::GlueError;

/// Symbol placeholder in signature templates
pub const PLACEHOLDER: &str = "{0}";

/// One native-callable export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    /// Linker symbol
    pub name: String,
    /// C declaration template with one `{0}` for the symbol
    pub signature: String,
}

impl ExportRecord {
    /// The C declaration with the symbol substituted
    pub fn declaration(&self) -> String {
        self.signature.replacen(PLACEHOLDER, &self.name, 1)
    }
}

/// Parse and validate an export list
pub fn parse_exports(json: &str) -> Result<Vec<ExportRecord>, GlueError> {
    let records = match serde_json::from_str::<Value>(json)? {
        Value::Array(records) => records,
        _ => {
            return Err(GlueError::MalformedExports {
                index: None,
                reason: "expected an array of records".to_string(),
            })
        }
    };

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let field = |key: &str| -> Result<String, GlueError> {
                record
                    .get(key)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| GlueError::MalformedExports {
                        index: Some(index),
                        reason: format!("missing or non-string field '{}'", key),
                    })
            };
            let export = ExportRecord {
                name: field("name")?,
                signature: field("signature")?,
            };

            let count = export.signature.matches(PLACEHOLDER).count();
            if count != 1 {
                return Err(GlueError::Placeholder {
                    name: export.name,
                    signature: export.signature,
                    count,
                });
            }
            Ok(export)
        })
        .collect()
}
