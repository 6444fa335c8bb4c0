//! Local against remote set difference by content hash.

use std::collections::{BTreeMap, HashSet};

use crate::sync::LocalFile;

/// Local files whose content is missing remotely. When several local files
/// share a missing hash only the first one is returned.
pub fn upload_set<'a>(local: &'a [LocalFile], remote_hashes: &HashSet<&str>) -> Vec<&'a LocalFile> {
    let mut queued: HashSet<&str> = HashSet::new();
    local
        .iter()
        .filter(|file| !remote_hashes.contains(file.md5_checksum.as_str()))
        .filter(|file| queued.insert(file.md5_checksum.as_str()))
        .collect()
}

/// Groups of local files with identical content.
pub fn local_duplicates(local: &[LocalFile]) -> BTreeMap<&str, Vec<&LocalFile>> {
    let mut by_hash: BTreeMap<&str, Vec<&LocalFile>> = BTreeMap::new();
    for file in local {
        by_hash.entry(file.md5_checksum.as_str()).or_default().push(file);
    }
    by_hash.retain(|_, files| files.len() > 1);
    by_hash
}

/// Distinct hashes among local files.
pub fn local_hashes(local: &[LocalFile]) -> HashSet<&str> {
    local.iter().map(|file| file.md5_checksum.as_str()).collect()
}
