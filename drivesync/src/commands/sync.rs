//! Uploads of local files whose content is missing from a Google Drive
//! folder, with checkpoints so an interrupted sync can be resumed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gdrive_core::{ApiRequest, FileUpload};
use tracing::{error, info};

use super::CommandError;
use super::snapshot::snapshot_folders;
use crate::drive::{DriveTree, Snapshot};
use crate::reconcile::{local_duplicates, local_hashes, upload_set};
use crate::remote::{Operation, PolicyTable, RemoteService, ResilientRunner, Strategy};
use crate::sync::{SyncArgs, SyncCheckpoint, guess_mime, scan};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub planned: usize,
    pub uploaded: usize,
}

/// Starts a new sync from `args`. The checkpoint lives in `working_dir`.
pub async fn start<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    args: SyncArgs,
    working_dir: &Path,
) -> Result<SyncReport, CommandError> {
    let checkpoint = prepare(tree, args, working_dir).await?;
    run_checkpoint(tree, checkpoint).await
}

/// Continues the most recent checkpoint in `working_dir`. With `clear`, every
/// checkpoint there is removed instead.
pub async fn resume<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    working_dir: &Path,
    clear: bool,
) -> Result<SyncReport, CommandError> {
    if clear {
        let removed = SyncCheckpoint::clear_all(working_dir)?;
        info!("Removed {removed} pending sync states");
        return Ok(SyncReport {
            planned: 0,
            uploaded: 0,
        });
    }

    let checkpoint = SyncCheckpoint::latest(working_dir)?
        .ok_or_else(|| CommandError::NothingToResume(working_dir.to_path_buf()))?;
    info!("Resuming sync {}", checkpoint.id);
    run_checkpoint(tree, checkpoint).await
}

async fn prepare<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    args: SyncArgs,
    working_dir: &Path,
) -> Result<SyncCheckpoint, CommandError> {
    info!("Computing MD5 hashes for files under {}", args.local.display());
    let mut local_files = scan(&args.local)?;

    if args.include_pictures_only {
        local_files.retain(|file| {
            let keep = file.is_media();
            if !keep {
                info!(
                    "Excluding {} with MIME type {}",
                    file.path.display(),
                    file.mime_type
                );
            }
            keep
        });
    }

    if !args.allow_duplicates {
        let duplicates = local_duplicates(&local_files);
        if !duplicates.is_empty() {
            for (hash, files) in &duplicates {
                error!("Files with MD5 {hash} are identical:");
                for file in files {
                    error!("    {}", file.path.display());
                }
            }
            return Err(CommandError::LocalDuplicates(duplicates.len()));
        }
    }

    let exclusions = cacheable_exclusions(tree, &args).await?;
    Ok(SyncCheckpoint::new(working_dir, args, exclusions, local_files))
}

/// Exclusions that do not change while a sync runs: stored snapshots and
/// folders other than the target.
async fn cacheable_exclusions<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    args: &SyncArgs,
) -> Result<Snapshot, CommandError> {
    let mut exclusions = Snapshot::default();
    for path in &args.exclude_snapshot {
        info!("Excluding files listed in snapshot {}", path.display());
        exclusions = exclusions.merge(&Snapshot::load(path)?);
    }
    for folder in &args.exclude_folder {
        info!("Excluding files under Google Drive folder {folder}");
        exclusions = exclusions.merge(&snapshot_folders(tree, std::slice::from_ref(folder)).await?);
    }
    Ok(exclusions)
}

async fn run_checkpoint<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    mut checkpoint: SyncCheckpoint,
) -> Result<SyncReport, CommandError> {
    let remote = checkpoint.args.remote.clone();
    let target = tree.find_folder(&remote).await?;

    // The target changes as files are uploaded, so it is listed on every run.
    info!("Examining contents of Google Drive folder {remote}");
    let live = Snapshot::new(tree.list(&target, true).await?);
    let exclusions = checkpoint.snapshot.merge(&live);
    let remote_hashes = exclusions.content_hashes();

    let uploads: Vec<PathBuf> = upload_set(&checkpoint.local_files, &remote_hashes)
        .into_iter()
        .map(|file| file.path.clone())
        .collect();
    info!(
        "There are {} local files, {} remote files",
        local_hashes(&checkpoint.local_files).len(),
        remote_hashes.len()
    );
    info!("{} files will be synced", uploads.len());

    let mut runner = ResilientRunner::new(tree.service(), Strategy::Sequential)
        .with_policies(PolicyTable::defaults())
        .with_config(tree.runner_config());
    for path in &uploads {
        runner.add(
            path.display().to_string(),
            upload_operation(path.clone(), target.id.clone()),
        )?;
    }

    let planned = uploads.len();
    if checkpoint.args.dry_run {
        info!("Dry run: no changes made.");
        checkpoint.clear()?;
        return Ok(SyncReport {
            planned,
            uploaded: 0,
        });
    }

    if !checkpoint.persisted {
        checkpoint.persist()?;
    }

    let mut uploaded = 0;
    runner
        .execute_with(|completed| {
            uploaded += 1;
            info!(
                "{} successfully uploaded to {remote} ({uploaded} of {planned})",
                completed.id
            );
        })
        .await?;

    checkpoint.clear()?;
    Ok(SyncReport { planned, uploaded })
}

/// Reads the file only when the runner reaches it.
fn upload_operation(path: PathBuf, folder_id: String) -> Operation {
    Operation::deferred(move || {
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(ApiRequest::Create(FileUpload {
            name,
            parents: vec![folder_id.clone()],
            mime_type: guess_mime(&path),
            body: fs::read(&path)?,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RunnerError;
    use crate::remote::testing::FakeDrive;
    use tempfile::TempDir;

    fn md5_of(content: &str) -> String {
        format!("{:x}", md5::compute(content.as_bytes()))
    }

    fn drive() -> FakeDrive {
        FakeDrive::with_items(vec![
            FakeDrive::folder("root", "My Drive", None),
            FakeDrive::folder("pics", "Pictures", Some("root")),
            FakeDrive::folder("archive", "Archive", Some("root")),
            FakeDrive::file("h", "hello.jpg", "pics", &md5_of("hello")),
            FakeDrive::file("w", "old-world.jpg", "archive", &md5_of("world")),
        ])
    }

    fn local_folder(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn args(local: &Path) -> SyncArgs {
        SyncArgs {
            local: local.to_path_buf(),
            remote: "/Pictures".into(),
            ..SyncArgs::default()
        }
    }

    fn uploaded_names(fake: &FakeDrive) -> Vec<String> {
        let mut names: Vec<_> = fake.uploads().into_iter().map(|(name, _, _)| name).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn uploads_missing_content_and_clears_checkpoint() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("a.jpg", "hello"), ("b.jpg", "world"), ("notes.txt", "x")]);
        let work = tempfile::tempdir().unwrap();

        let report = start(&tree, args(local.path()), work.path()).await.unwrap();

        assert_eq!(report, SyncReport { planned: 2, uploaded: 2 });
        assert_eq!(uploaded_names(&fake), vec!["b.jpg", "notes.txt"]);
        assert!(fake.uploads().iter().all(|(_, parents, _)| parents == &["pics"]));
        assert!(SyncCheckpoint::discover(work.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn exclusions_and_picture_filter_shrink_the_upload() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world"), ("c.jpg", "new"), ("notes.txt", "x")]);
        let work = tempfile::tempdir().unwrap();
        let mut args = args(local.path());
        args.exclude_folder = vec!["/Archive".into()];
        args.include_pictures_only = true;

        let report = start(&tree, args, work.path()).await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(uploaded_names(&fake), vec!["c.jpg"]);
    }

    #[tokio::test]
    async fn dry_run_uploads_nothing_and_leaves_no_state() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world")]);
        let work = tempfile::tempdir().unwrap();
        let mut args = args(local.path());
        args.dry_run = true;

        let report = start(&tree, args, work.path()).await.unwrap();

        assert_eq!(report, SyncReport { planned: 1, uploaded: 0 });
        assert!(fake.uploads().is_empty());
        assert!(SyncCheckpoint::discover(work.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn identical_local_files_abort_unless_allowed() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world"), ("b-copy.jpg", "world")]);
        let work = tempfile::tempdir().unwrap();

        let err = start(&tree, args(local.path()), work.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::LocalDuplicates(1)));
        assert!(fake.calls().is_empty());

        let mut allowed = args(local.path());
        allowed.allow_duplicates = true;
        let report = start(&tree, allowed, work.path()).await.unwrap();
        assert_eq!(report.uploaded, 1);
    }

    #[tokio::test]
    async fn failed_sync_can_be_resumed() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world"), ("c.jpg", "new")]);
        let work = tempfile::tempdir().unwrap();
        fake.fail("c.jpg", "401", None, 1);

        let err = start(&tree, args(local.path()), work.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommandError::Runner(RunnerError::Unrecoverable { .. })
        ));
        let pending = SyncCheckpoint::discover(work.path()).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].persisted);

        let report = resume(&tree, work.path(), false).await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(uploaded_names(&fake), vec!["b.jpg", "c.jpg"]);
        assert!(SyncCheckpoint::discover(work.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn resume_without_state_is_reported() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let work = tempfile::tempdir().unwrap();

        let err = resume(&tree, work.path(), false).await.unwrap_err();

        assert!(matches!(err, CommandError::NothingToResume(_)));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn resume_clear_removes_all_state() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let work = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let mut checkpoint =
                SyncCheckpoint::new(work.path(), SyncArgs::default(), Snapshot::default(), vec![]);
            checkpoint.persist().unwrap();
        }

        resume(&tree, work.path(), true).await.unwrap();

        assert!(SyncCheckpoint::discover(work.path()).unwrap().is_empty());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn corrupt_state_does_not_block_resume() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world")]);
        let work = tempfile::tempdir().expect("tempdir");
        fs::write(work.path().join("1-1.sync"), "{").expect("write corrupt state");
        fake.fail("b.jpg", "401", None, 1);
        start(&tree, args(local.path()), work.path())
            .await
            .expect_err("upload rejected");

        let report = resume(&tree, work.path(), false).await.expect("resume");
        assert_eq!(report.uploaded, 1);

        resume(&tree, work.path(), true).await.expect("clear");
        assert!(!work.path().join("1-1.sync").exists());
    }

    #[tokio::test]
    async fn missing_target_is_structural() {
        let fake = drive();
        let tree = DriveTree::new(&fake);
        let local = local_folder(&[("b.jpg", "world")]);
        let work = tempfile::tempdir().unwrap();
        let mut args = args(local.path());
        args.remote = "/Nowhere".into();

        let err = start(&tree, args, work.path()).await.unwrap_err();

        assert!(err.is_structural());
    }
}
