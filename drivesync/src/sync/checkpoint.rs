//! Durable record of an in-progress sync.
//!
//! A checkpoint is written to the working directory before any upload starts
//! and removed once every upload went through. It carries the local scan and
//! the cacheable exclusions, so a resumed sync neither re-hashes local files
//! nor re-lists excluded folders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use super::local::LocalFile;
use crate::drive::Snapshot;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid checkpoint {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Arguments of the sync that created a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncArgs {
    pub local: PathBuf,
    pub remote: String,
    #[serde(default)]
    pub exclude_snapshot: Vec<PathBuf>,
    #[serde(default)]
    pub exclude_folder: Vec<String>,
    #[serde(default)]
    pub include_pictures_only: bool,
    #[serde(default)]
    pub allow_duplicates: bool,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub working_directory: PathBuf,
    pub args: SyncArgs,
    pub snapshot: Snapshot,
    pub local_files: Vec<LocalFile>,
    pub persisted: bool,
}

impl SyncCheckpoint {
    pub fn new(
        working_directory: impl Into<PathBuf>,
        args: SyncArgs,
        snapshot: Snapshot,
        local_files: Vec<LocalFile>,
    ) -> Self {
        let created_at = OffsetDateTime::now_utc();
        let id = format!(
            "{}-{}.sync",
            created_at.unix_timestamp(),
            rand::thread_rng().gen_range(0..100_000)
        );
        Self {
            id,
            created_at,
            working_directory: working_directory.into(),
            args,
            snapshot,
            local_files,
            persisted: false,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.working_directory.join(&self.id)
    }

    /// Writes the checkpoint through a partial file renamed into place, so a
    /// crash never leaves a truncated checkpoint behind. `persisted` is set
    /// before writing so the stored copy records it, and reverted if the
    /// write fails.
    pub fn persist(&mut self) -> Result<(), CheckpointError> {
        let path = self.path();
        info!(
            "Saving sync state at {}. Use `sync resume` to resume the sync in case of failures.",
            path.display()
        );
        self.persisted = true;
        let result = self.write_atomically(&path);
        if result.is_err() {
            self.persisted = false;
        }
        result
    }

    fn write_atomically(&self, path: &Path) -> Result<(), CheckpointError> {
        let raw = serde_json::to_vec(self).map_err(|source| CheckpointError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        let partial = self.working_directory.join(format!(".{}.partial", self.id));
        let io_error = |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::write(&partial, raw).map_err(io_error)?;
        fs::rename(&partial, path).map_err(|source| {
            let _ = fs::remove_file(&partial);
            io_error(source)
        })
    }

    /// Removes the stored checkpoint. A checkpoint that was never written is
    /// not an error.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        let path = self.path();
        info!("Removing sync state {}", path.display());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound && !self.persisted => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }

    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        info!("Reading sync state from {}.", path.display());
        let raw = fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| CheckpointError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads every checkpoint stored in `dir`. Files that cannot be read or
    /// parsed are skipped with a warning.
    pub fn discover(dir: &Path) -> Result<Vec<Self>, CheckpointError> {
        let mut checkpoints = Vec::new();
        for path in checkpoint_paths(dir)? {
            match Self::read(&path) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(err) => warn!("Ignoring unreadable sync state: {err}"),
            }
        }
        Ok(checkpoints)
    }

    /// Removes every checkpoint file in `dir` without parsing it, so corrupt
    /// ones go too. Returns how many were removed.
    pub fn clear_all(dir: &Path) -> Result<usize, CheckpointError> {
        let paths = checkpoint_paths(dir)?;
        for path in &paths {
            info!("Removing sync state {}", path.display());
            fs::remove_file(path).map_err(|source| CheckpointError::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(paths.len())
    }

    /// The most recent checkpoint in `dir`. Older ones stay on disk untouched.
    pub fn latest(dir: &Path) -> Result<Option<Self>, CheckpointError> {
        let mut checkpoints = Self::discover(dir)?;
        if checkpoints.len() > 1 {
            warn!("More than one sync state found. Will use the most recent.");
        }
        checkpoints.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(checkpoints.into_iter().next())
    }
}

/// Files in `dir` named like checkpoints, in name order.
fn checkpoint_paths(dir: &Path) -> Result<Vec<PathBuf>, CheckpointError> {
    let io_error = |source| CheckpointError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if entry.file_name().to_str().is_some_and(is_checkpoint_name) {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn is_checkpoint_name(name: &str) -> bool {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^[0-9]+-[0-9]+\.sync$").expect("valid regex"))
        .is_match(name)
}
