//! `ilbridge glue`: native glue from the compiler's export list and static map.

use std::fs::{self, File};
use std::path::Path;

use anyhow::Context;
use ilbridge_engine::{GlueConfig, GlueGenerator, GlueSummary};

pub fn execute(exports: &Path, map: &Path, output: &Path, config: GlueConfig) -> anyhow::Result<GlueSummary> {
    let exports_in = File::open(exports).with_context(|| format!("Failed to open {}", exports.display()))?;
    let map_in = File::open(map).with_context(|| format!("Failed to open {}", map.display()))?;

    // Render into memory so a failed run leaves no output file behind.
    let mut unit = Vec::new();
    let summary = GlueGenerator::new(config)
        .exports(exports_in)
        .static_map(map_in)
        .output(&mut unit)
        .generate()
        .with_context(|| format!("Failed to generate glue from {} and {}", exports.display(), map.display()))?;

    fs::write(output, unit).with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(summary)
}
