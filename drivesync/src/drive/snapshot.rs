use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::resource::Resource;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Point-in-time collection of remote resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    entries: Vec<Resource>,
}

impl Snapshot {
    pub fn new(entries: Vec<Resource>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[Resource] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Resource> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenates both snapshots. Entries sharing an id are kept side by side.
    pub fn merge(&self, other: &Snapshot) -> Snapshot {
        let mut entries = Vec::with_capacity(self.entries.len() + other.entries.len());
        entries.extend_from_slice(&self.entries);
        entries.extend_from_slice(&other.entries);
        Snapshot { entries }
    }

    pub fn content_hashes(&self) -> HashSet<&str> {
        self.entries
            .iter()
            .filter_map(Resource::content_hash)
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn store(&self, path: &Path) -> Result<(), SnapshotError> {
        let raw = serde_json::to_string_pretty(self).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, raw).map_err(|source| SnapshotError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
