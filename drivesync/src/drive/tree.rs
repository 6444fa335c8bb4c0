//! Folder navigation: the drive root, named children, recursive listing and
//! path lookup.

use std::collections::{HashSet, VecDeque};

use gdrive_core::{ApiRequest, FileList, ITEM_FIELDS};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use super::resource::{Resource, ResourceError};
use crate::remote::{
    Operation, PolicyTable, RemoteService, ResilientRunner, RunnerConfig, RunnerError, Strategy,
};

pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("unexpected response for {request}: {source}")]
    Payload {
        request: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no response for {0}")]
    NoResponse(String),
    #[error("resource {0} not found")]
    NotFound(String),
    #[error("ambiguous resource alias {0}")]
    Ambiguous(String),
    #[error("{0} is not a Google Drive folder")]
    NotAFolder(String),
}

/// Read access to the folder hierarchy. Every call goes through a
/// [`ResilientRunner`] so transient failures are retried.
pub struct DriveTree<'s, S> {
    service: &'s S,
    runner: RunnerConfig,
    page_size: u32,
}

impl<'s, S: RemoteService> DriveTree<'s, S> {
    pub fn new(service: &'s S) -> Self {
        Self {
            service,
            runner: RunnerConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_runner_config(mut self, config: RunnerConfig) -> Self {
        self.runner = config;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn service(&self) -> &'s S {
        self.service
    }

    pub fn runner_config(&self) -> RunnerConfig {
        self.runner
    }

    pub async fn root(&self) -> Result<Resource, TreeError> {
        let value = self.fetch(ApiRequest::get("root", ITEM_FIELDS)).await?;
        Ok(Resource::from_value(value)?)
    }

    pub async fn children_named(
        &self,
        folder: &Resource,
        name: &str,
    ) -> Result<Vec<Resource>, TreeError> {
        let query = format!(
            "'{}' in parents and name = '{}'",
            escape_query(&folder.id),
            escape_query(name)
        );
        self.list_query(&query, folder.display_name()).await
    }

    /// Lists the contents of `folder`. With `recurse`, subfolders are listed
    /// once the current folder is exhausted; each folder is visited once.
    pub async fn list(&self, folder: &Resource, recurse: bool) -> Result<Vec<Resource>, TreeError> {
        let mut visited = HashSet::from([folder.id.clone()]);
        let mut queue = VecDeque::from([folder.clone()]);
        let mut entries = Vec::new();

        while let Some(current) = queue.pop_front() {
            info!("Scanning folder <{}>.", current.display_name());
            let query = format!("'{}' in parents", escape_query(&current.id));
            let children = self.list_query(&query, current.display_name()).await?;
            info!("Done scanning <{}>.", current.display_name());

            for child in &children {
                if recurse && child.is_folder() && visited.insert(child.id.clone()) {
                    debug!(
                        "Recursing into subfolder <{}/{}>",
                        current.display_name(),
                        child.display_name()
                    );
                    queue.push_back(child.clone());
                }
            }
            entries.extend(children);
        }
        Ok(entries)
    }

    /// Walks `path` from the root. Every intermediate element must resolve to
    /// exactly one folder; the final element may match several resources.
    pub async fn find_by_path(&self, path: &str) -> Result<Vec<Resource>, TreeError> {
        let mut current = vec![self.root().await?];
        for element in path.split('/').filter(|element| !element.is_empty()) {
            let folder = unique(current, path)?;
            if !folder.is_folder() {
                return Err(TreeError::NotAFolder(folder.display_name().to_string()));
            }
            current = self.children_named(&folder, element).await?;
        }
        Ok(current)
    }

    pub async fn find_folder(&self, path: &str) -> Result<Resource, TreeError> {
        let resource = unique(self.find_by_path(path).await?, path)?;
        if !resource.is_folder() {
            return Err(TreeError::NotAFolder(path.to_string()));
        }
        Ok(resource)
    }

    /// Fetches many resources by id in batches. A missing id is an error.
    pub async fn get_resources<I>(&self, ids: I) -> Result<Vec<Resource>, TreeError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut runner = ResilientRunner::new(self.service, Strategy::Batched)
            .with_policies(PolicyTable::fail_on_missing())
            .with_config(self.runner);
        for id in ids {
            let operation = Operation::ready(ApiRequest::get(id.as_str(), ITEM_FIELDS));
            runner.add(id, operation)?;
        }

        let mut resources = Vec::with_capacity(runner.len());
        for completed in runner.execute().await? {
            resources.push(Resource::from_value(completed.payload)?);
        }
        Ok(resources)
    }

    async fn list_query(&self, query: &str, label: &str) -> Result<Vec<Resource>, TreeError> {
        let mut entries = Vec::new();
        let mut page_token = None;
        loop {
            let page: FileList = self
                .fetch_as(ApiRequest::list(query, self.page_size, page_token.take()))
                .await?;
            for item in page.files {
                entries.push(Resource::from_item(item)?);
            }
            info!("Examined {} entries in folder <{label}>.", entries.len());
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(entries),
            }
        }
    }

    async fn fetch_as<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, TreeError> {
        let label = request.target().to_string();
        let value = self.fetch(request).await?;
        serde_json::from_value(value).map_err(|source| TreeError::Payload {
            request: label,
            source,
        })
    }

    async fn fetch(&self, request: ApiRequest) -> Result<serde_json::Value, TreeError> {
        let id = request.target().to_string();
        let mut runner = ResilientRunner::new(self.service, Strategy::Sequential)
            .with_policies(PolicyTable::fail_on_missing())
            .with_config(self.runner);
        runner.add(id.clone(), Operation::ready(request))?;
        runner
            .execute()
            .await?
            .pop()
            .map(|completed| completed.payload)
            .ok_or(TreeError::NoResponse(id))
    }
}

/// Returns the single element of `resources`, failing when there are none or
/// several.
pub fn unique<T>(mut resources: Vec<T>, alias: &str) -> Result<T, TreeError> {
    match resources.len() {
        0 => Err(TreeError::NotFound(alias.to_string())),
        1 => Ok(resources.remove(0)),
        _ => Err(TreeError::Ambiguous(alias.to_string())),
    }
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
