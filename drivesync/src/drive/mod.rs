pub mod hierarchy;
pub mod resource;
pub mod snapshot;
pub mod tree;

pub use hierarchy::{HierarchyError, ResourcePath, resolve_paths};
pub use resource::{Resource, ResourceError, ResourceKind};
pub use snapshot::{Snapshot, SnapshotError};
pub use tree::{DEFAULT_PAGE_SIZE, DriveTree, TreeError, unique};
