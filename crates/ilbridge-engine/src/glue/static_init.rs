//! Static-init emitter
//!
//! Each type with static fields gets a compiler-generated accessor that
//! creates its static storage on first call. The native host calls every
//! such accessor once at startup so storage exists before managed code runs.

use std::fmt::{self, Write};

use indexmap::IndexSet;

use super::config::GlueConfig;

/// Prefix of mutable static storage accessors
pub const GC_STATIC_BASE: &str = "__GetGCStaticBase_";
/// Prefix of immutable static storage accessors
pub const NON_GC_STATIC_BASE: &str = "__GetNonGCStaticBase_";

/// Static storage accessors among `names`, deduplicated in first-seen order
pub fn static_base_stubs<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    names
        .into_iter()
        .filter(|name| name.starts_with(GC_STATIC_BASE) || name.starts_with(NON_GC_STATIC_BASE))
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

/// Check if `name` can be declared directly in C
pub fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn c_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A stub as declared in C: the name code calls, and the real symbol if different
struct Declared<'a> {
    local: String,
    symbol: &'a str,
}

impl Declared<'_> {
    fn is_alias(&self) -> bool {
        self.local != self.symbol
    }
}

/// Emit stub declarations and the initializer function
pub fn emit_static_init(out: &mut String, stubs: &[String], config: &GlueConfig) -> fmt::Result {
    let declared: Vec<Declared<'_>> = stubs
        .iter()
        .enumerate()
        .map(|(i, symbol)| Declared {
            local: if is_c_identifier(symbol) {
                symbol.clone()
            } else {
                format!("ilbridge_alias_{}_{}", i, sanitize(symbol))
            },
            symbol,
        })
        .collect();

    writeln!(out, "/* ilbridge: static storage initialization */")?;
    writeln!(out)?;

    if declared.iter().any(Declared::is_alias) {
        writeln!(out, "#if !defined(_MSC_VER)")?;
        writeln!(out, "#if defined(__APPLE__)")?;
        writeln!(out, "#define ILBRIDGE_SYMBOL(name) \"_\" name")?;
        writeln!(out, "#else")?;
        writeln!(out, "#define ILBRIDGE_SYMBOL(name) name")?;
        writeln!(out, "#endif")?;
        writeln!(out, "#endif")?;
        writeln!(out)?;
    }

    for stub in &declared {
        if stub.is_alias() {
            let symbol = c_string(stub.symbol);
            writeln!(out, "#if defined(_MSC_VER)")?;
            writeln!(out, "extern void* {}(void);", stub.local)?;
            writeln!(out, "#pragma comment(linker, \"/alternatename:{}={}\")", stub.local, symbol)?;
            writeln!(out, "#else")?;
            writeln!(out, "extern void* {}(void) __asm__(ILBRIDGE_SYMBOL(\"{}\"));", stub.local, symbol)?;
            writeln!(out, "#endif")?;
        } else {
            writeln!(out, "extern void* {}(void);", stub.local)?;
        }
    }
    if !declared.is_empty() {
        writeln!(out)?;
    }

    writeln!(out, "void {}(void)", config.initializer)?;
    writeln!(out, "{{")?;
    for stub in &declared {
        writeln!(out, "    {}();", stub.local)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)
}
