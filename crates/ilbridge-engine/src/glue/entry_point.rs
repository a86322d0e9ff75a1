//! Entry-point emitter.
//!
//! `main` only passes metadata and arguments on to the runtime; the runtime
//! entry point calls the static initializer itself before any managed code.

use std::fmt::{self, Write};

use super::config::GlueConfig;

/// Emit setter declarations and `main`
///
/// Description and version are written between quotes as given, without
/// escaping.
pub fn emit_entry_point(out: &mut String, config: &GlueConfig) -> fmt::Result {
    let setters: Vec<(&str, &str)> = [
        (config.description_setter.as_str(), config.description.as_str()),
        (config.version_setter.as_str(), config.version.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .collect();

    writeln!(out, "/* ilbridge: entry point */")?;
    writeln!(out)?;
    for (setter, _) in &setters {
        writeln!(out, "extern void {}(const char* value);", setter)?;
    }
    writeln!(out, "extern int {}(int argc, char* argv[]);", config.runtime_main)?;
    writeln!(out)?;

    writeln!(
        out,
        "/* {}() must call {}() before running managed code. */",
        config.runtime_main, config.initializer
    )?;
    writeln!(out, "int main(int argc, char* argv[])")?;
    writeln!(out, "{{")?;
    for (setter, value) in &setters {
        writeln!(out, "    {}(\"{}\");", setter, value)?;
    }
    writeln!(out, "    return {}(argc, argv);", config.runtime_main)?;
    writeln!(out, "}}")
}
