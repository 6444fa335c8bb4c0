//! Duplicate detection and prefix-ranked removal planning.

use std::collections::{BTreeMap, HashMap};

use super::ReconcileError;
use crate::drive::{Resource, ResourcePath, Snapshot};

/// Files of `snapshot` grouped by checksum, keeping only groups with more
/// than one member. Members stay in snapshot order.
pub fn group_duplicates(snapshot: &Snapshot) -> BTreeMap<String, Vec<Resource>> {
    let mut by_hash: BTreeMap<String, Vec<Resource>> = BTreeMap::new();
    for entry in snapshot.entries() {
        if let Some(hash) = entry.content_hash() {
            let members = by_hash.entry(hash.to_string()).or_default();
            // A resource listed twice is not a duplicate of itself.
            if !members.contains(entry) {
                members.push(entry.clone());
            }
        }
    }
    by_hash.retain(|_, members| members.len() > 1);
    by_hash
}

/// Splits a comma separated preference list. Each prefix is trimmed and made
/// to end with `/` so `/Pictures/New` does not match `/Pictures/Newer`.
pub fn normalize_prefixes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|prefix| !prefix.is_empty())
        .map(|prefix| {
            if prefix.ends_with('/') {
                prefix.to_string()
            } else {
                format!("{prefix}/")
            }
        })
        .collect()
}

/// Index of the first prefix each path starts with.
pub fn rank(prefixes: &[String], paths: &[&ResourcePath]) -> Result<Vec<usize>, ReconcileError> {
    paths
        .iter()
        .map(|path| {
            prefixes
                .iter()
                .position(|prefix| path.starts_with(prefix))
                .ok_or_else(|| ReconcileError::UnmatchedPrefix(path.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PlannedDeletion {
    pub resource: Resource,
    pub path: ResourcePath,
}

impl PlannedDeletion {
    /// Identifier used when queueing the delete request.
    pub fn request_id(&self) -> String {
        format!("{} ({})", self.path, self.resource.id)
    }
}

/// For every group, keeps the best ranked member and plans deletion of the
/// rest. Equal ranks keep the member seen first.
pub fn plan_deletions(
    duplicates: &BTreeMap<String, Vec<Resource>>,
    paths: &HashMap<String, ResourcePath>,
    prefixes: &[String],
) -> Result<Vec<PlannedDeletion>, ReconcileError> {
    let mut planned = Vec::new();
    for members in duplicates.values() {
        let member_paths = members
            .iter()
            .map(|member| {
                paths
                    .get(&member.id)
                    .ok_or_else(|| ReconcileError::MissingPath(member.id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ranks = rank(prefixes, &member_paths)?;

        let mut ranked: Vec<(usize, &Resource, &ResourcePath)> = ranks
            .into_iter()
            .zip(members.iter())
            .zip(member_paths)
            .map(|((rank, member), path)| (rank, member, path))
            .collect();
        ranked.sort_by_key(|(rank, _, _)| *rank);

        planned.extend(
            ranked
                .into_iter()
                .skip(1)
                .map(|(_, resource, path)| PlannedDeletion {
                    resource: resource.clone(),
                    path: path.clone(),
                }),
        );
    }
    Ok(planned)
}
