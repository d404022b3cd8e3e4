//! # strata-cli
//!
//! Command-line interface for Strata models.
//!
//! - `strata init` — create an empty model
//! - `strata create/list/show/delete` — manage changesets
//! - `strata stage/unstage/discard` — edit a changeset
//! - `strata activate/deactivate/active` — the active changeset marker
//! - `strata diff/preview/drift/snapshot` — inspect before committing
//! - `strata commit` — apply a changeset atomically, with rollback
//! - `strata backups/verify-backup` — inspect commit backups

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Strata — stage, preview, and commit changes to a layered model.
#[derive(Parser)]
#[command(name = "strata", version, about)]
struct Cli {
    /// Model root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    model: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty model with the given layers.
    Init {
        /// Model name recorded in the manifest.
        name: String,
        /// Comma-separated layer names.
        #[arg(long, value_delimiter = ',', default_value = "business,application,technology")]
        layers: Vec<String>,
    },
    #[command(flatten)]
    Changeset(commands::changeset::ChangesetCommands),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with command output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let model_root = cli.model.canonicalize().unwrap_or(cli.model);
    tracing::debug!("model root: {}", model_root.display());

    match &cli.command {
        Commands::Init { name, layers } => commands::model::init(&model_root, name, layers),
        Commands::Changeset(command) => commands::changeset::execute(command, &model_root),
    }
}
