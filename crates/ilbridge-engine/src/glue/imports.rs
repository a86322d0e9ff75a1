//! Import emitter: extern declarations for every export plus the handle
//! accessor native code uses to turn a callback handle back into a function
//! pointer.

use std::fmt::{self, Write};

use super::config::GlueConfig;
use super::exports::ExportRecord;

/// Emit headers, export declarations and the accessor
pub fn emit_imports(out: &mut String, exports: &[ExportRecord], config: &GlueConfig) -> fmt::Result {
    writeln!(out, "/* ilbridge: callback imports */")?;
    writeln!(out)?;
    writeln!(out, "#include <stddef.h>")?;
    writeln!(out, "#include <stdint.h>")?;
    writeln!(out)?;

    for export in exports {
        writeln!(out, "extern {};", export.declaration())?;
    }
    if !exports.is_empty() {
        writeln!(out)?;
    }

    writeln!(out, "void* {}(int32_t handle)", config.accessor)?;
    writeln!(out, "{{")?;
    if exports.is_empty() {
        writeln!(out, "    (void)handle;")?;
        writeln!(out, "    return NULL;")?;
    } else {
        let count = exports.len();
        writeln!(out, "    static void* const table[{}] = {{", count)?;
        for export in exports {
            writeln!(out, "        (void*)&{},", export.name)?;
        }
        writeln!(out, "    }};")?;
        writeln!(out, "    if (handle < 0 || handle >= {}) {{", count)?;
        writeln!(out, "        return NULL;")?;
        writeln!(out, "    }}")?;
        writeln!(out, "    return table[handle];")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)
}
