use std::collections::{BTreeMap, HashMap};
use std::io::Write;

use gdrive_core::ApiRequest;
use serde_json::{Value, json};
use tracing::info;

use super::CommandError;
use super::snapshot::snapshot_folders;
use crate::cli::{DedupAction, DedupArgs};
use crate::drive::{DriveTree, Resource, ResourcePath, Snapshot, resolve_paths};
use crate::reconcile::{group_duplicates, normalize_prefixes, plan_deletions};
use crate::remote::{Operation, PolicyTable, RemoteService, ResilientRunner, Strategy};

/// Duplicate groups keyed by checksum, with the path of every member.
#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub groups: BTreeMap<String, Vec<Resource>>,
    pub paths: HashMap<String, ResourcePath>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let groups: serde_json::Map<String, Value> = self
            .groups
            .iter()
            .map(|(hash, members)| {
                let members = members
                    .iter()
                    .map(|member| {
                        json!({
                            "id": member.id,
                            "path": self.path_of(member),
                        })
                    })
                    .collect();
                (hash.clone(), Value::Array(members))
            })
            .collect();
        Value::Object(groups)
    }

    fn path_of(&self, resource: &Resource) -> String {
        self.paths
            .get(&resource.id)
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("/{}", resource.display_name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub planned: usize,
    pub deleted: usize,
}

pub async fn find_duplicates<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    snapshot: &Snapshot,
) -> Result<DuplicateReport, CommandError> {
    let groups = group_duplicates(snapshot);
    if groups.is_empty() {
        return Ok(DuplicateReport::default());
    }

    let members: Vec<Resource> = groups.values().flatten().cloned().collect();
    let paths = resolve_paths(tree, &members)
        .await?
        .into_iter()
        .map(|(resource, path)| (resource.id, path))
        .collect();
    Ok(DuplicateReport { groups, paths })
}

/// Writes the duplicate listing. JSON goes to `out`; the readable form is
/// logged.
pub fn list<W: Write>(report: &DuplicateReport, json: bool, out: &mut W) -> std::io::Result<()> {
    if report.is_empty() {
        info!("Hooray! There are no duplicates in the snapshot.");
    } else {
        info!("Duplicates were found.");
    }

    if json {
        let rendered = serde_json::to_string_pretty(&report.to_json())?;
        writeln!(out, "{rendered}")?;
        return Ok(());
    }

    for (hash, members) in &report.groups {
        info!("{hash}:");
        for member in members {
            info!("    {} ({})", report.path_of(member), member.id);
        }
    }
    Ok(())
}

/// Deletes every duplicate except the copy under the most preferred prefix.
/// Nothing is deleted when any duplicate lies outside all prefixes.
pub async fn apply<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    report: &DuplicateReport,
    prefixes: &str,
    dry_run: bool,
) -> Result<ApplyReport, CommandError> {
    let prefixes = normalize_prefixes(prefixes);
    let planned = plan_deletions(&report.groups, &report.paths, &prefixes)?;

    let mut runner = ResilientRunner::new(tree.service(), Strategy::Batched)
        .with_policies(PolicyTable::defaults())
        .with_config(tree.runner_config());
    for deletion in &planned {
        let rid = deletion.request_id();
        info!("Queue request for deleting duplicate {rid}");
        runner.add(rid, Operation::ready(ApiRequest::delete(&deletion.resource.id)))?;
    }

    if dry_run {
        info!("Dry run. No changes applied.");
        return Ok(ApplyReport {
            planned: planned.len(),
            deleted: 0,
        });
    }

    let mut deleted = 0;
    runner
        .execute_with(|completed| {
            deleted += 1;
            info!("Successfully deleted {}", completed.id);
        })
        .await?;
    Ok(ApplyReport {
        planned: planned.len(),
        deleted,
    })
}

pub async fn run<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    args: &DedupArgs,
) -> Result<(), CommandError> {
    let snapshot = match (&args.snapshot, &args.folder) {
        (Some(path), _) => Snapshot::load(path)?,
        (None, Some(folder)) => snapshot_folders(tree, std::slice::from_ref(folder)).await?,
        (None, None) => Snapshot::default(),
    };
    let report = find_duplicates(tree, &snapshot).await?;

    match &args.action {
        DedupAction::List { json } => {
            let mut stdout = std::io::stdout().lock();
            list(&report, *json, &mut stdout).map_err(CommandError::Output)?;
        }
        DedupAction::Apply { prefixes, dry_run } => {
            apply(tree, &report, prefixes, *dry_run).await?;
        }
    }
    Ok(())
}
