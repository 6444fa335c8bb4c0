use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

const MEDIA_TYPES: &[&str] = &["image/", "video/", "audio/"];

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to walk local folder: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{} has a name that is not valid UTF-8, rename it before syncing", .0.display())]
    NonUtf8Path(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: PathBuf,
    pub mime_type: String,
    pub md5_checksum: String,
}

impl LocalFile {
    pub fn is_media(&self) -> bool {
        MEDIA_TYPES
            .iter()
            .any(|prefix| self.mime_type.starts_with(prefix))
    }
}

/// Recursively hashes every regular file under `root`, in file-name order.
pub fn scan(root: &Path) -> Result<Vec<LocalFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        // Checkpoints store paths as JSON strings.
        if path.to_str().is_none() {
            return Err(ScanError::NonUtf8Path(path));
        }
        debug!("Analyzing {}", path.display());
        let md5_checksum = hash_file(&path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;
        files.push(LocalFile {
            mime_type: guess_mime(&path),
            md5_checksum,
            path,
        });
    }
    Ok(files)
}

pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = Context::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}
