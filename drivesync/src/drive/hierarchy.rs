//! Bulk resolution of resource paths.
//!
//! Ancestors are fetched one hierarchy level at a time for all leaves
//! together, so resolving N leaves at depth D costs D round trips rather than
//! N * D.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::resource::Resource;
use super::tree::{DriveTree, TreeError};
use crate::remote::RemoteService;

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("resource {0} has multiple parents, which is not supported")]
    MultipleParents(String),
    #[error("could not resolve ancestors {0:?}")]
    Unresolvable(Vec<String>),
    #[error("resource {0} is its own ancestor")]
    Cycle(String),
}

/// A resource with its ancestors ordered from the top of the hierarchy down.
#[derive(Debug, Clone)]
pub struct ResourcePath {
    pub resource: Resource,
    pub ancestors: Vec<Resource>,
}

impl ResourcePath {
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.to_string().starts_with(prefix)
    }
}

/// Renders as `/A/B/name`. The topmost ancestor is left out when it has no
/// parent of its own, since that is the drive root.
impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let skip = match self.ancestors.first() {
            Some(top) if top.parents.is_empty() => 1,
            _ => 0,
        };
        for ancestor in &self.ancestors[skip..] {
            write!(f, "/{}", ancestor.display_name())?;
        }
        write!(f, "/{}", self.resource.display_name())
    }
}

pub async fn resolve_paths<S: RemoteService>(
    tree: &DriveTree<'_, S>,
    leaves: &[Resource],
) -> Result<Vec<(Resource, ResourcePath)>, HierarchyError> {
    let mut table: HashMap<String, Resource> = leaves
        .iter()
        .map(|leaf| (leaf.id.clone(), leaf.clone()))
        .collect();

    loop {
        let unresolved: BTreeSet<String> = table
            .values()
            .flat_map(|resource| resource.parents.iter())
            .filter(|parent| !table.contains_key(*parent))
            .cloned()
            .collect();
        if unresolved.is_empty() {
            break;
        }

        debug!(count = unresolved.len(), "fetching ancestors");
        let fetched = tree.get_resources(unresolved.iter().cloned()).await?;
        let before = table.len();
        for resource in fetched {
            table.insert(resource.id.clone(), resource);
        }
        if table.len() == before {
            return Err(HierarchyError::Unresolvable(unresolved.into_iter().collect()));
        }
    }

    leaves
        .iter()
        .map(|leaf| {
            let ancestors = ancestors_of(leaf, &table)?;
            Ok((
                leaf.clone(),
                ResourcePath {
                    resource: leaf.clone(),
                    ancestors,
                },
            ))
        })
        .collect()
}

fn ancestors_of(
    leaf: &Resource,
    table: &HashMap<String, Resource>,
) -> Result<Vec<Resource>, HierarchyError> {
    let mut ancestors = Vec::new();
    let mut seen = HashSet::from([leaf.id.as_str()]);
    let mut current = leaf;

    loop {
        let parent_id = match current.parents.as_slice() {
            [] => break,
            [parent] => parent,
            _ => return Err(HierarchyError::MultipleParents(current.to_string())),
        };
        let parent = table
            .get(parent_id)
            .ok_or_else(|| HierarchyError::Unresolvable(vec![parent_id.clone()]))?;
        if !seen.insert(parent.id.as_str()) {
            return Err(HierarchyError::Cycle(parent.id.clone()));
        }
        ancestors.push(parent.clone());
        current = parent;
    }

    ancestors.reverse();
    Ok(ancestors)
}
