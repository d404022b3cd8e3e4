// observer.rs — Optional hooks around each commit phase.
//
// The commit protocol calls `on_phase_start` / `on_phase_end` around every
// phase it runs. Observers see the phase and its outcome but cannot change
// control flow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The phases of a commit, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPhase {
    Load,
    DriftCheck,
    Validate,
    DryRun,
    Backup,
    Apply,
    Persist,
    Finalize,
    Cleanup,
    Rollback,
}

impl fmt::Display for CommitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitPhase::Load => "load",
            CommitPhase::DriftCheck => "drift check",
            CommitPhase::Validate => "validation",
            CommitPhase::DryRun => "dry run",
            CommitPhase::Backup => "backup",
            CommitPhase::Apply => "apply",
            CommitPhase::Persist => "persist",
            CommitPhase::Finalize => "finalize",
            CommitPhase::Cleanup => "cleanup",
            CommitPhase::Rollback => "rollback",
        };
        write!(f, "{}", name)
    }
}

/// Receives commit phase boundaries.
///
/// Implementations must not panic; anything they do is outside the commit's
/// critical section.
pub trait CommitObserver: Send {
    fn on_phase_start(&self, changeset_id: &str, phase: CommitPhase);

    /// `ok` is false when the phase ended in an error.
    fn on_phase_end(&self, changeset_id: &str, phase: CommitPhase, ok: bool);
}

/// Observer that does nothing. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CommitObserver for NoopObserver {
    fn on_phase_start(&self, _changeset_id: &str, _phase: CommitPhase) {}

    fn on_phase_end(&self, _changeset_id: &str, _phase: CommitPhase, _ok: bool) {}
}

/// Emits one `tracing` event per phase boundary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CommitObserver for TracingObserver {
    fn on_phase_start(&self, changeset_id: &str, phase: CommitPhase) {
        tracing::debug!(changeset = changeset_id, %phase, "commit phase started");
    }

    fn on_phase_end(&self, changeset_id: &str, phase: CommitPhase, ok: bool) {
        if ok {
            tracing::debug!(changeset = changeset_id, %phase, "commit phase finished");
        } else {
            tracing::warn!(changeset = changeset_id, %phase, "commit phase failed");
        }
    }
}
