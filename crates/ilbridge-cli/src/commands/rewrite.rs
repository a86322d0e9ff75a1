//! `ilbridge rewrite`: one pass of all rules over a module file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ilbridge_bytecode::Module;
use ilbridge_engine::rewrite::{
    CallbackHandleRewriter, CallbackTable, InterfaceCallRewriter, PassReport, RewriteConfig, Rewriter,
    StaticTypeRegistry, WorkerTypeCollector,
};
use tempfile::NamedTempFile;

/// Side table of callback handles
pub const CALLBACKS_FILE: &str = "callbacks.json";
/// Side table of worker types
pub const WORKERS_FILE: &str = "workers.json";

/// What the command did
#[derive(Debug)]
pub struct RewriteOutcome {
    pub report: PassReport,
    pub callbacks: usize,
    pub workers: usize,
}

fn side_table(output: &Path, name: &str) -> PathBuf {
    output
        .parent()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

/// An output written to a temporary sibling, not yet in place
struct Staged {
    path: PathBuf,
    file: NamedTempFile,
}

fn stage(path: &Path, contents: &str) -> anyhow::Result<Staged> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file =
        NamedTempFile::new_in(dir).with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Staged {
        path: path.to_path_buf(),
        file,
    })
}

/// Move every staged output into place, in order.
///
/// If one fails, the outputs already moved are deleted again.
fn commit(staged: Vec<Staged>) -> anyhow::Result<()> {
    let mut written: Vec<PathBuf> = Vec::new();
    for Staged { path, file } in staged {
        if let Err(err) = file.persist(&path) {
            for done in &written {
                let _ = fs::remove_file(done);
            }
            return Err(anyhow::Error::new(err.error).context(format!("Failed to write {}", path.display())));
        }
        tracing::debug!("wrote {}", path.display());
        written.push(path);
    }
    Ok(())
}

pub fn execute(
    module_path: &Path,
    registry_path: &Path,
    output: &Path,
    config: RewriteConfig,
) -> anyhow::Result<RewriteOutcome> {
    let json = fs::read_to_string(module_path)
        .with_context(|| format!("Failed to read module {}", module_path.display()))?;
    let mut module =
        Module::from_json(&json).with_context(|| format!("Failed to load module {}", module_path.display()))?;

    let registry_json = fs::read_to_string(registry_path)
        .with_context(|| format!("Failed to read registry {}", registry_path.display()))?;
    let registry = StaticTypeRegistry::from_json(&registry_json)
        .with_context(|| format!("Invalid registry {}", registry_path.display()))?;

    let mut interfaces = InterfaceCallRewriter::new(registry);
    let mut callbacks = CallbackHandleRewriter::new(CallbackTable::new());
    let mut workers = WorkerTypeCollector::new(config.worker_factory.clone());

    let report = Rewriter::new(config)
        .register(&mut interfaces)
        .register(&mut callbacks)
        .register(&mut workers)
        .run(&mut module)
        .with_context(|| format!("Failed to rewrite {}", module_path.display()))?;

    let callbacks = callbacks.into_registry();
    let workers = workers.into_types();

    let module_json = module.to_json()?;
    let callbacks_json = serde_json::to_string_pretty(&callbacks)?;
    let workers_json = serde_json::to_string_pretty(&workers)?;

    // The module goes last so it only appears next to complete side tables.
    commit(vec![
        stage(&side_table(output, CALLBACKS_FILE), &callbacks_json)?,
        stage(&side_table(output, WORKERS_FILE), &workers_json)?,
        stage(output, &module_json)?,
    ])?;

    Ok(RewriteOutcome {
        report,
        callbacks: callbacks.len(),
        workers: workers.len(),
    })
}
