pub mod checkpoint;
pub mod local;

pub use checkpoint::{CheckpointError, SyncArgs, SyncCheckpoint, is_checkpoint_name};
pub use local::{LocalFile, ScanError, guess_mime, hash_file, scan};
