use std::fmt;
use std::hash::{Hash, Hasher};

use gdrive_core::{DriveItem, FOLDER_MIME_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid resource payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{kind} {id} has no name")]
    MissingName { kind: &'static str, id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Generic,
    Folder,
    File,
}

/// A remote entity. Two resources are equal when their ids are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "ResourceRecord", from = "ResourceRecord")]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub mime_type: String,
    pub parents: Vec<String>,
    pub name: Option<String>,
    pub md5_checksum: Option<String>,
}

impl Resource {
    /// Classifies a raw item. Folders are recognised by MIME type and files by
    /// the presence of a checksum; both must be named.
    pub fn from_item(item: DriveItem) -> Result<Self, ResourceError> {
        let kind = if item.mime_type == FOLDER_MIME_TYPE {
            ResourceKind::Folder
        } else if item.md5_checksum.is_some() {
            ResourceKind::File
        } else {
            ResourceKind::Generic
        };

        let (name, md5_checksum) = match kind {
            ResourceKind::Generic => (None, None),
            ResourceKind::Folder => (Some(require_name(&item, "folder")?), None),
            ResourceKind::File => (Some(require_name(&item, "file")?), item.md5_checksum),
        };

        Ok(Self {
            id: item.id,
            kind,
            mime_type: item.mime_type,
            parents: item.parents,
            name,
            md5_checksum,
        })
    }

    pub fn from_value(value: Value) -> Result<Self, ResourceError> {
        Self::from_item(serde_json::from_value(value)?)
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ResourceKind::Folder
    }

    /// The name when there is one, the id otherwise.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn content_hash(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::File => self.md5_checksum.as_deref(),
            _ => None,
        }
    }
}

fn require_name(item: &DriveItem, kind: &'static str) -> Result<String, ResourceError> {
    item.name.clone().ok_or_else(|| ResourceError::MissingName {
        kind,
        id: item.id.clone(),
    })
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResourceKind::Folder => write!(f, "Folder \"{}\" ({})", self.display_name(), self.id),
            ResourceKind::File => write!(
                f,
                "File \"{}\" ({}, {}, {})",
                self.display_name(),
                self.mime_type,
                self.md5_checksum.as_deref().unwrap_or("-"),
                self.id
            ),
            ResourceKind::Generic => write!(f, "{} : {}", self.id, self.mime_type),
        }
    }
}

/// On-disk form of a resource, discriminated by a `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum ResourceRecord {
    Folder {
        id: String,
        mime_type: String,
        #[serde(default)]
        parents: Vec<String>,
        name: String,
    },
    File {
        id: String,
        mime_type: String,
        #[serde(default)]
        parents: Vec<String>,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        md5_checksum: Option<String>,
    },
    #[serde(rename = "resource")]
    Generic {
        id: String,
        mime_type: String,
        #[serde(default)]
        parents: Vec<String>,
    },
}

impl From<Resource> for ResourceRecord {
    fn from(resource: Resource) -> Self {
        let Resource {
            id,
            kind,
            mime_type,
            parents,
            name,
            md5_checksum,
        } = resource;
        match kind {
            ResourceKind::Folder => ResourceRecord::Folder {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                mime_type,
                parents,
            },
            ResourceKind::File => ResourceRecord::File {
                name: name.unwrap_or_else(|| id.clone()),
                id,
                mime_type,
                parents,
                md5_checksum,
            },
            ResourceKind::Generic => ResourceRecord::Generic {
                id,
                mime_type,
                parents,
            },
        }
    }
}

impl From<ResourceRecord> for Resource {
    fn from(record: ResourceRecord) -> Self {
        match record {
            ResourceRecord::Folder {
                id,
                mime_type,
                parents,
                name,
            } => Resource {
                id,
                kind: ResourceKind::Folder,
                mime_type,
                parents,
                name: Some(name),
                md5_checksum: None,
            },
            ResourceRecord::File {
                id,
                mime_type,
                parents,
                name,
                md5_checksum,
            } => Resource {
                id,
                kind: ResourceKind::File,
                mime_type,
                parents,
                name: Some(name),
                md5_checksum,
            },
            ResourceRecord::Generic {
                id,
                mime_type,
                parents,
            } => Resource {
                id,
                kind: ResourceKind::Generic,
                mime_type,
                parents,
                name: None,
                md5_checksum: None,
            },
        }
    }
}
