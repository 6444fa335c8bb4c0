pub mod dedup;
pub mod snapshot;
pub mod sync;

use std::path::PathBuf;

use thiserror::Error;

use crate::drive::{HierarchyError, SnapshotError, TreeError};
use crate::reconcile::ReconcileError;
use crate::remote::RunnerError;
use crate::sync::{CheckpointError, ScanError};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
    #[error("no sync state found in {0}, nothing to resume")]
    NothingToResume(PathBuf),
    #[error("{0} groups of duplicate files in the local folder, re-run with --allow-duplicates to sync anyway")]
    LocalDuplicates(usize),
}

impl CommandError {
    /// Inconsistencies in the user's data or arguments, as opposed to
    /// failures talking to the service. They are never retried.
    pub fn is_structural(&self) -> bool {
        match self {
            CommandError::Tree(err) => is_structural_tree(err),
            CommandError::Hierarchy(HierarchyError::Tree(err)) => is_structural_tree(err),
            CommandError::Hierarchy(_) => true,
            CommandError::Reconcile(_) => true,
            CommandError::NothingToResume(_) | CommandError::LocalDuplicates(_) => true,
            _ => false,
        }
    }
}

fn is_structural_tree(err: &TreeError) -> bool {
    matches!(
        err,
        TreeError::NotFound(_) | TreeError::Ambiguous(_) | TreeError::NotAFolder(_)
    )
}
