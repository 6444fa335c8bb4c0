use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::sync::SyncArgs;

#[derive(Debug, Parser)]
#[command(name = "drivesync")]
#[command(about = "Deduplicate Google Drive and upload local files it does not have yet")]
#[command(version, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a snapshot of Google Drive metadata
    Snapshot(SnapshotArgs),
    /// Hunts down and removes duplicate files from Google Drive
    Dedup(DedupArgs),
    /// Uploads local files with no matching checksum in Google Drive
    Sync(SyncCommand),
    /// Removes stored credentials
    Logout,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Google Drive folders to record, e.g. "/Pictures/2019". Use "/" for the whole drive
    #[arg(required = true, value_name = "FOLDER")]
    pub folders: Vec<String>,

    /// File the snapshot is written to
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["snapshot", "folder"])))]
pub struct DedupArgs {
    /// Look for duplicates inside a snapshot created with `snapshot`
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Look for duplicates under a Google Drive folder
    #[arg(long)]
    pub folder: Option<String>,

    #[command(subcommand)]
    pub action: DedupAction,
}

#[derive(Debug, Subcommand)]
pub enum DedupAction {
    /// Lists duplicates grouped by checksum
    List {
        /// Print the listing as JSON on stdout
        #[arg(long)]
        json: bool,
    },
    /// Removes duplicates, keeping the copy under the most preferred prefix
    Apply {
        /// Comma separated path prefixes, most preferred first. A duplicate
        /// outside every prefix aborts the run
        #[arg(long)]
        prefixes: String,

        /// Print the plan without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub struct SyncCommand {
    #[command(subcommand)]
    pub command: Option<SyncSubcommand>,

    #[command(flatten)]
    pub args: SyncCliArgs,
}

#[derive(Debug, Subcommand)]
pub enum SyncSubcommand {
    /// Resumes the most recent interrupted sync in the current directory
    Resume {
        /// Delete every pending sync state instead of resuming
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Debug, Args)]
pub struct SyncCliArgs {
    /// Local folder to upload from
    #[arg(required = true)]
    pub local: Option<PathBuf>,

    /// Existing Google Drive folder to upload into
    #[arg(required = true)]
    pub remote: Option<String>,

    /// Skip files present in this snapshot. May be repeated
    #[arg(long, value_name = "FILE")]
    pub exclude_snapshot: Vec<PathBuf>,

    /// Skip files present anywhere under this Google Drive folder. May be repeated
    #[arg(long, value_name = "PATH")]
    pub exclude_folder: Vec<String>,

    /// Only sync image, video and audio files
    #[arg(long)]
    pub include_pictures_only: bool,

    /// Sync even when the local folder holds duplicate files
    #[arg(long)]
    pub allow_duplicates: bool,

    /// Report what would be uploaded without changing Google Drive
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncCliArgs {
    pub fn into_sync_args(self) -> Option<SyncArgs> {
        Some(SyncArgs {
            local: self.local?,
            remote: self.remote?,
            exclude_snapshot: self.exclude_snapshot,
            exclude_folder: self.exclude_folder,
            include_pictures_only: self.include_pictures_only,
            allow_duplicates: self.allow_duplicates,
            dry_run: self.dry_run,
        })
    }
}
