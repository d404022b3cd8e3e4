// changeset.rs — Changeset subcommands: create, list, show, delete, stage,
// unstage, discard, commit, activate, deactivate, active, drift, snapshot,
// diff, preview, backups, verify-backup.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use serde_json::{Map, Value};
use strata_changeset::{Changeset, StagedChange};
use strata_model::{FileModel, Model};
use strata_workspace::{CommitOptions, StagingArea};

#[derive(Subcommand)]
pub enum ChangesetCommands {
    /// Create a new changeset based on the current model.
    Create {
        /// Display name; the id is derived from it.
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Also make it the active changeset.
        #[arg(long)]
        activate: bool,
    },
    /// List all changesets, newest first.
    List,
    /// Show a changeset and its staged changes.
    Show {
        /// Changeset id or name.
        id: String,
    },
    /// Delete a changeset record.
    Delete { id: String },
    /// Stage one change into a changeset.
    Stage {
        id: String,
        #[arg(value_enum)]
        kind: ChangeKind,
        layer: String,
        element: String,
        /// Element fields as a JSON object (required for add and update).
        #[arg(long)]
        fields: Option<String>,
    },
    /// Remove every staged change for an element.
    Unstage { id: String, element: String },
    /// Drop all changes and mark the changeset discarded.
    #[command(alias = "revert")]
    Discard { id: String },
    /// Commit a changeset to the model.
    #[command(alias = "apply")]
    Commit {
        id: String,
        /// Commit even if the base model has drifted.
        #[arg(long)]
        force: bool,
        /// Skip validation of the projected model.
        #[arg(long)]
        no_validate: bool,
        /// Report what would be applied without changing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark a changeset as the active one.
    Activate { id: String },
    /// Clear the active changeset marker.
    Deactivate,
    /// Show the active changeset.
    Active,
    /// Check whether the model changed since the changeset's base snapshot.
    Drift { id: String },
    /// Record the current model as the changeset's base snapshot.
    Snapshot { id: String },
    /// Show staged changes grouped into additions, modifications, deletions.
    Diff { id: String },
    /// Show the model as it would look after committing.
    Preview {
        id: String,
        /// Only this layer.
        #[arg(long)]
        layer: Option<String>,
        /// Only this element.
        #[arg(long, conflicts_with = "layer")]
        element: Option<String>,
    },
    /// List backup directories, including ones left behind by failures.
    Backups,
    /// Verify a backup directory against its checksum manifest.
    VerifyBackup { path: PathBuf },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
}

pub fn execute(cmd: &ChangesetCommands, model_root: &Path) -> anyhow::Result<()> {
    let mut area = open(model_root)?;

    match cmd {
        ChangesetCommands::Create {
            name,
            description,
            activate,
        } => {
            let cs = area.create(name, description)?;
            println!("Created changeset '{}' ({})", cs.id, cs.name);
            if *activate {
                area.set_active(&cs.id)?;
                println!("  Active: yes");
            }
        }

        ChangesetCommands::List => {
            let changesets = area.list()?;
            if changesets.is_empty() {
                println!("No changesets.");
                return Ok(());
            }
            let active = area.get_active_id()?;
            println!(
                "{:<2} {:<28} {:<10} {:>7} {:<20}",
                "", "ID", "STATUS", "CHANGES", "CREATED"
            );
            println!("{}", "-".repeat(72));
            for cs in changesets {
                let marker = if active.as_deref() == Some(cs.id.as_str()) { "*" } else { "" };
                println!(
                    "{:<2} {:<28} {:<10} {:>7} {:<20}",
                    marker,
                    cs.id,
                    cs.status.to_string(),
                    cs.changes.len(),
                    cs.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }

        ChangesetCommands::Show { id } => {
            let cs = area.load(id)?;
            print_changeset(&cs);
        }

        ChangesetCommands::Delete { id } => {
            area.delete(id)?;
            println!("Deleted changeset '{}'", id);
        }

        ChangesetCommands::Stage {
            id,
            kind,
            layer,
            element,
            fields,
        } => {
            let after = fields.as_deref().map(parse_fields).transpose()?;
            let before = area
                .model()
                .element_by_id(element)
                .map(|(_, e)| e.to_fields());
            let change = match kind {
                ChangeKind::Add => StagedChange::add(
                    layer,
                    element,
                    after.context("add requires --fields")?,
                ),
                ChangeKind::Update => StagedChange::update(
                    layer,
                    element,
                    before,
                    after.context("update requires --fields")?,
                ),
                ChangeKind::Delete => StagedChange::delete(layer, element, before),
            };
            let stored = area.stage(id, change)?;
            println!(
                "Staged #{} {} '{}' in layer '{}'",
                stored.sequence_number, stored.change_type, stored.element_id, stored.layer_name
            );
        }

        ChangesetCommands::Unstage { id, element } => {
            let removed = area.unstage(id, element)?;
            println!("Unstaged {} change(s) for '{}'", removed.len(), element);
        }

        ChangesetCommands::Discard { id } => {
            area.discard(id)?;
            println!("Discarded changeset '{}'", id);
        }

        ChangesetCommands::Commit {
            id,
            force,
            no_validate,
            dry_run,
        } => {
            let options = CommitOptions {
                force: *force,
                validate: !*no_validate,
                dry_run: *dry_run,
            };
            match area.commit(id, options) {
                Ok(result) => {
                    if result.dry_run {
                        println!("Dry run: {} change(s) would be applied", result.applied);
                    } else {
                        println!("Committed changeset '{}'", result.changeset_id);
                        println!("  Applied: {} change(s)", result.applied);
                        println!("  Layers saved: {}", result.layers_saved.join(", "));
                        if let Some(path) = &result.backup_path {
                            println!("  Backup kept at: {}", path.display());
                        }
                    }
                    for warning in &result.warnings {
                        println!("  Warning: {}", warning);
                    }
                }
                Err(e) => {
                    if let Some(failure) = e.commit_failure() {
                        eprintln!("{}", failure.report());
                        anyhow::bail!("commit of '{}' failed", id);
                    }
                    return Err(e.into());
                }
            }
        }

        ChangesetCommands::Activate { id } => {
            let cs = area.set_active(id)?;
            println!("Active changeset: {} ({})", cs.id, cs.name);
        }

        ChangesetCommands::Deactivate => {
            area.clear_active()?;
            println!("No active changeset.");
        }

        ChangesetCommands::Active => match area.get_active()? {
            Some(cs) => print_changeset(&cs),
            None => println!("No active changeset."),
        },

        ChangesetCommands::Drift { id } => {
            let report = area.detect_drift(id)?;
            if report.is_drifted {
                println!("DRIFTED: the model changed since '{}' was created.", id);
            } else {
                println!("No drift detected for '{}'.", id);
            }
            println!(
                "  Base:    {}",
                report.base_snapshot_id.as_deref().unwrap_or("(none)")
            );
            println!("  Current: {}", report.current_snapshot_id);
            for warning in &report.warnings {
                println!("  Warning: {}", warning);
            }
        }

        ChangesetCommands::Snapshot { id } => {
            let snapshot = area.capture_base_snapshot(id)?;
            println!("Base snapshot for '{}': {}", id, snapshot);
        }

        ChangesetCommands::Diff { id } => {
            let diff = area.diff(id)?;
            if diff.is_empty() {
                println!("No staged changes.");
                return Ok(());
            }
            for (label, changes) in [
                ("Additions", &diff.additions),
                ("Modifications", &diff.modifications),
                ("Deletions", &diff.deletions),
            ] {
                if changes.is_empty() {
                    continue;
                }
                println!("{} ({}):", label, changes.len());
                for change in changes {
                    println!("  #{:<4} {}/{}", change.sequence_number, change.layer_name, change.element_id);
                }
            }
        }

        ChangesetCommands::Preview { id, layer, element } => {
            if let Some(element_id) = element {
                match area.preview_element(id, element_id)? {
                    Some(el) => println!("{}", serde_json::to_string_pretty(&el)?),
                    None => println!("'{}' would not exist after committing '{}'.", element_id, id),
                }
            } else if let Some(layer_name) = layer {
                let projected = area.preview_layer(id, layer_name)?;
                println!("{}", serde_json::to_string_pretty(&*projected)?);
            } else {
                let projected = area.preview_model(id)?;
                for layer in projected.layers() {
                    println!("{} ({} element(s))", layer.name, layer.elements.len());
                    for el in &layer.elements {
                        println!("  {:<24} {:<16} {}", el.id, el.element_type, el.name);
                    }
                }
            }
        }

        ChangesetCommands::Backups => {
            let backups = area.backups().list_backups()?;
            if backups.is_empty() {
                println!("No backups.");
            }
            for path in backups {
                println!("{}", path.display());
            }
        }

        ChangesetCommands::VerifyBackup { path } => {
            let report = area.validate_backup_integrity(path)?;
            if report.is_valid {
                println!(
                    "Backup verified: {} file(s), all checksums match.",
                    report.files_checked
                );
            } else {
                println!(
                    "BACKUP DAMAGED: {} problem(s) in {} file(s):",
                    report.errors.len(),
                    report.files_checked
                );
                for error in &report.errors {
                    println!("  - {}", error);
                }
                anyhow::bail!("backup integrity check failed");
            }
        }
    }

    Ok(())
}

fn open(model_root: &Path) -> anyhow::Result<StagingArea<FileModel>> {
    let model = FileModel::open(model_root)
        .with_context(|| format!("no readable model at {}", model_root.display()))?;
    Ok(StagingArea::open(model)?)
}

fn parse_fields(json: &str) -> anyhow::Result<Map<String, Value>> {
    serde_json::from_str(json).context("--fields must be a JSON object")
}

fn print_changeset(cs: &Changeset) {
    println!("Changeset: {} ({})", cs.id, cs.name);
    if !cs.description.is_empty() {
        println!("  Description: {}", cs.description);
    }
    println!("  Status:   {}", cs.status);
    println!("  Created:  {}", cs.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Modified: {}", cs.modified_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "  Changes:  {} (+{} ~{} -{})",
        cs.stats.total(),
        cs.stats.additions,
        cs.stats.modifications,
        cs.stats.deletions
    );
    for change in cs.ordered_changes() {
        println!(
            "    #{:<4} {:<7} {}/{}",
            change.sequence_number,
            change.change_type.to_string(),
            change.layer_name,
            change.element_id
        );
    }
}
