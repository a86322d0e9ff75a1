//! ilbridge command-line driver
//!
//! Runs the two build stages of a bridged program:
//! `ilbridge rewrite` over the managed module before AOT compilation, and
//! `ilbridge glue` over the compiler's outputs to produce the native host.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter
const LOG_ENV: &str = "ILBRIDGE_LOG";

#[derive(Parser)]
#[command(name = "ilbridge")]
#[command(about = "Managed-to-native bridge build tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./ilbridge.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite a module: retarget interface calls, assign callback handles,
    /// collect worker types
    Rewrite {
        /// Input module (JSON)
        module: PathBuf,
        /// Type registry (JSON)
        #[arg(short, long)]
        registry: PathBuf,
        /// Output module; callbacks.json and workers.json are written next to it
        #[arg(short, long)]
        output: PathBuf,
        /// Skip the stack verifier after the pass
        #[arg(long)]
        no_verify: bool,
    },

    /// Generate the native glue translation unit
    Glue {
        /// Export list (JSON)
        #[arg(short, long)]
        exports: PathBuf,
        /// Static map (XML)
        #[arg(short, long)]
        map: PathBuf,
        /// Output C file
        #[arg(short, long)]
        output: PathBuf,
        /// Program description passed to the runtime
        #[arg(long)]
        description: Option<String>,
        /// Program version passed to the runtime
        #[arg(long = "app-version")]
        app_version: Option<String>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Rewrite {
            module,
            registry,
            output,
            no_verify,
        } => {
            let mut rewrite = config.rewrite;
            if no_verify {
                rewrite = rewrite.with_verify(false);
            }
            let outcome = commands::rewrite::execute(&module, &registry, &output, rewrite)?;
            println!(
                "Rewrote {} ({}); {} callbacks, {} worker types",
                module.display(),
                outcome.report,
                outcome.callbacks,
                outcome.workers
            );
        }

        Commands::Glue {
            exports,
            map,
            output,
            description,
            app_version,
        } => {
            let mut glue = config.glue;
            if let Some(description) = description {
                glue = glue.with_description(description);
            }
            if let Some(version) = app_version {
                glue = glue.with_version(version);
            }
            let summary = commands::glue::execute(&exports, &map, &output, glue)?;
            println!(
                "Wrote {} ({} exports, {} static bases)",
                output.display(),
                summary.exports,
                summary.static_bases
            );
        }
    }

    Ok(())
}
