use std::collections::HashSet;

use tracing::info;

use super::CommandError;
use crate::cli::SnapshotArgs;
use crate::drive::{DriveTree, Snapshot};
use crate::remote::RemoteService;

/// Lists every given folder recursively. Entries reachable from more than one
/// of the folders are kept once.
pub async fn snapshot_folders<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    paths: &[String],
) -> Result<Snapshot, CommandError> {
    let mut entries = Vec::new();
    for path in paths {
        let folder = tree.find_folder(path).await?;
        entries.extend(tree.list(&folder, true).await?);
    }

    let total = entries.len();
    let mut seen = HashSet::new();
    entries.retain(|entry| seen.insert(entry.id.clone()));
    info!("There were {total} entries, {} unique.", entries.len());

    Ok(Snapshot::new(entries))
}

pub async fn run<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    args: &SnapshotArgs,
) -> Result<(), CommandError> {
    let snapshot = snapshot_folders(tree, &args.folders).await?;
    snapshot.store(&args.output)?;
    info!(
        "Snapshot of {} entries written to {}",
        snapshot.len(),
        args.output.display()
    );
    Ok(())
}
