//! In-memory stand-in for the Drive service used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use gdrive_core::{ApiRequest, BatchReply, DriveError, ErrorSignature, StatusCode};
use serde_json::{Value, json};

use super::operation::RemoteService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Single(String),
    Batch(Vec<String>),
}

/// Serves `files.get`, `files.list`, `files.delete` and uploads from a map of
/// items. Errors can be scripted per request target and are consumed one per
/// call before the item map is consulted.
#[derive(Default)]
pub(crate) struct FakeDrive {
    items: Mutex<Vec<Value>>,
    failures: Mutex<HashMap<String, VecDeque<ErrorSignature>>>,
    /// Whole batch calls that fail before any member is served. `None`
    /// fails with an error that carries no signature.
    batch_failures: Mutex<VecDeque<Option<ErrorSignature>>>,
    calls: Mutex<Vec<Call>>,
    uploads: Mutex<Vec<(String, Vec<String>, usize)>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<Value>) -> Self {
        let fake = Self::new();
        *fake.items.lock().unwrap() = items;
        fake
    }

    pub fn folder(id: &str, name: &str, parent: Option<&str>) -> Value {
        json!({
            "id": id,
            "name": name,
            "mimeType": gdrive_core::FOLDER_MIME_TYPE,
            "parents": parent.into_iter().collect::<Vec<_>>(),
        })
    }

    pub fn file(id: &str, name: &str, parent: &str, md5: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "mimeType": "image/jpeg",
            "parents": [parent],
            "md5Checksum": md5,
        })
    }

    /// Makes the next `times` calls targeting `target` fail with `code`.
    pub fn fail(&self, target: &str, code: &str, reason: Option<&str>, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(target.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(ErrorSignature::new(code, reason));
        }
    }

    /// Makes the next `times` batch calls fail as a whole with `code`.
    pub fn fail_batches(&self, code: &str, reason: Option<&str>, times: usize) {
        let mut failures = self.batch_failures.lock().unwrap();
        for _ in 0..times {
            failures.push_back(Some(ErrorSignature::new(code, reason)));
        }
    }

    /// Makes the next batch call return a response that cannot be decoded.
    pub fn garble_next_batch(&self) {
        self.batch_failures.lock().unwrap().push_back(None);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Batch(ids) => Some(ids.len()),
                Call::Single(_) => None,
            })
            .collect()
    }

    pub fn uploads(&self) -> Vec<(String, Vec<String>, usize)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.lock().unwrap().iter().any(|item| item["id"] == id)
    }

    fn respond(&self, request: &ApiRequest) -> Result<Value, DriveError> {
        if let Some(signature) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(request.target())
            .and_then(VecDeque::pop_front)
        {
            return Err(error_for(signature));
        }

        let mut items = self.items.lock().unwrap();
        match request {
            ApiRequest::Get { file_id, .. } => items
                .iter()
                .find(|item| item["id"] == file_id.as_str())
                .cloned()
                .ok_or_else(|| not_found(file_id)),
            ApiRequest::Delete { file_id } => {
                let before = items.len();
                items.retain(|item| item["id"] != file_id.as_str());
                if items.len() == before {
                    Err(not_found(file_id))
                } else {
                    Ok(Value::Null)
                }
            }
            ApiRequest::List {
                query,
                page_size,
                page_token,
                ..
            } => {
                let (parent, name) = parse_query(query);
                let matching: Vec<Value> = items
                    .iter()
                    .filter(|item| {
                        item["parents"]
                            .as_array()
                            .is_some_and(|parents| parents.iter().any(|p| p == parent.as_str()))
                    })
                    .filter(|item| name.as_ref().is_none_or(|name| item["name"] == name.as_str()))
                    .cloned()
                    .collect();
                let offset: usize = page_token
                    .as_deref()
                    .and_then(|token| token.parse().ok())
                    .unwrap_or(0);
                let end = (offset + *page_size as usize).min(matching.len());
                let mut page = json!({ "files": matching[offset..end].to_vec() });
                if end < matching.len() {
                    page["nextPageToken"] = Value::String(end.to_string());
                }
                Ok(page)
            }
            ApiRequest::Create(upload) => {
                let id = format!("new-{}", upload.name);
                items.push(json!({
                    "id": id,
                    "name": upload.name,
                    "mimeType": upload.mime_type,
                    "parents": upload.parents,
                    "md5Checksum": format!("{:x}", md5::compute(&upload.body)),
                }));
                self.uploads.lock().unwrap().push((
                    upload.name.clone(),
                    upload.parents.clone(),
                    upload.body.len(),
                ));
                Ok(json!({ "id": id }))
            }
        }
    }
}

impl RemoteService for FakeDrive {
    async fn call(&self, request: ApiRequest) -> Result<Value, DriveError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Single(request.target().to_string()));
        self.respond(&request)
    }

    async fn call_batch(
        &self,
        requests: Vec<(String, ApiRequest)>,
    ) -> Result<Vec<BatchReply>, DriveError> {
        self.calls.lock().unwrap().push(Call::Batch(
            requests.iter().map(|(id, _)| id.clone()).collect(),
        ));
        if let Some(failure) = self.batch_failures.lock().unwrap().pop_front() {
            return Err(match failure {
                Some(signature) => error_for(signature),
                None => DriveError::MalformedBatch("response without boundary".into()),
            });
        }
        // Replies come back in reverse to exercise unordered delivery.
        Ok(requests
            .iter()
            .rev()
            .map(|(id, request)| BatchReply {
                id: id.clone(),
                result: self.respond(request),
            })
            .collect())
    }
}

fn parse_query(query: &str) -> (String, Option<String>) {
    let (parents, name) = match query.split_once(" and name = ") {
        Some((parents, name)) => (parents, Some(name)),
        None => (query, None),
    };
    let parent = parents
        .trim_end_matches(" in parents")
        .trim_matches('\'')
        .to_string();
    let name = name.map(|name| name.trim_matches('\'').replace("\\'", "'"));
    (parent, name)
}

fn error_for(signature: ErrorSignature) -> DriveError {
    match signature.code.parse::<u16>().ok().and_then(|c| StatusCode::from_u16(c).ok()) {
        Some(status) if signature.code != "104" => DriveError::Api {
            status,
            reason: signature.reason,
            message: "scripted failure".into(),
        },
        _ => DriveError::Batch {
            signature,
            message: "connection reset by peer".into(),
        },
    }
}

fn not_found(id: &str) -> DriveError {
    DriveError::Api {
        status: StatusCode::NOT_FOUND,
        reason: Some("notFound".into()),
        message: format!("File not found: {id}"),
    }
}
