//! Content-hash reconciliation between snapshots and local files.

pub mod dedup;
pub mod diff;

use thiserror::Error;

pub use dedup::{PlannedDeletion, group_duplicates, normalize_prefixes, plan_deletions, rank};
pub use diff::{local_duplicates, local_hashes, upload_set};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("path {0} is not covered by any of the specified prefixes")]
    UnmatchedPrefix(String),
    #[error("no resolved path for resource {0}")]
    MissingPath(String),
}
