use std::fmt;

use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::batch;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const CONNECTION_RESET: &str = "104";

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Maximum number of sub-requests the batch endpoint accepts in one call.
pub const BATCH_LIMIT: usize = 100;

/// Field projection covering every attribute the resource model reads.
pub const ITEM_FIELDS: &[&str] = &["id", "name", "mimeType", "parents", "md5Checksum"];

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api returned {status}: {message}")]
    Api {
        status: StatusCode,
        reason: Option<String>,
        message: String,
    },
    #[error("batch call failed with {signature}: {message}")]
    Batch {
        signature: ErrorSignature,
        message: String,
    },
    #[error("malformed batch response: {0}")]
    MalformedBatch(String),
    #[error("request cannot be sent in a batch: {0}")]
    Unbatchable(&'static str),
    #[error("batch holds {0} requests, the limit is 100")]
    BatchTooLarge(usize),
}

/// Status code plus the optional machine-readable reason of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ErrorSignature {
    pub code: String,
    pub reason: Option<String>,
}

impl ErrorSignature {
    pub fn new(code: impl Into<String>, reason: Option<&str>) -> Self {
        Self {
            code: code.into(),
            reason: reason.map(str::to_string),
        }
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{}/{}", self.code, reason),
            None => f.write_str(&self.code),
        }
    }
}

impl DriveError {
    /// Returns the signature used to look up a recovery policy. Transport
    /// failures on an established connection report as `104` (connection
    /// reset); errors without a signature are never recoverable.
    pub fn signature(&self) -> Option<ErrorSignature> {
        match self {
            DriveError::Api { status, reason, .. } => Some(ErrorSignature {
                code: status.as_u16().to_string(),
                reason: reason.clone(),
            }),
            DriveError::Batch { signature, .. } => Some(signature.clone()),
            DriveError::Request(err)
                if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() =>
            {
                Some(ErrorSignature::new(CONNECTION_RESET, None))
            }
            _ => None,
        }
    }
}

/// Raw file metadata as returned by `files.get` / `files.list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5_checksum: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub parents: Vec<String>,
    pub mime_type: String,
    pub body: Vec<u8>,
}

/// A single call against the files collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    Get {
        file_id: String,
        fields: Vec<String>,
    },
    List {
        query: String,
        page_size: u32,
        page_token: Option<String>,
        fields: Vec<String>,
    },
    Delete {
        file_id: String,
    },
    Create(FileUpload),
}

impl ApiRequest {
    pub fn get(file_id: impl Into<String>, fields: &[&str]) -> Self {
        ApiRequest::Get {
            file_id: file_id.into(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn list(query: impl Into<String>, page_size: u32, page_token: Option<String>) -> Self {
        ApiRequest::List {
            query: query.into(),
            page_size: page_size.max(1),
            page_token,
            fields: vec![
                "nextPageToken".to_string(),
                format!("files({})", ITEM_FIELDS.join(",")),
            ],
        }
    }

    pub fn delete(file_id: impl Into<String>) -> Self {
        ApiRequest::Delete {
            file_id: file_id.into(),
        }
    }

    /// Stable key identifying the target of the request, used for logging.
    pub fn target(&self) -> &str {
        match self {
            ApiRequest::Get { file_id, .. } | ApiRequest::Delete { file_id } => file_id,
            ApiRequest::List { query, .. } => query,
            ApiRequest::Create(upload) => &upload.name,
        }
    }
}

#[derive(Debug)]
pub struct BatchReply {
    pub id: String,
    pub result: Result<Value, DriveError>,
}

struct HttpCall {
    method: Method,
    url: Url,
    body: Option<(String, Vec<u8>)>,
}

impl HttpCall {
    fn request_line(&self) -> String {
        let target = match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        };
        format!("{} {} HTTP/1.1", self.method, target)
    }
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, DriveError> {
        let call = self.prepare(request)?;
        let mut builder = self
            .http
            .request(call.method, call.url)
            .bearer_auth(&self.token);
        if let Some((content_type, body)) = call.body {
            builder = builder.header(CONTENT_TYPE, content_type).body(body);
        }
        let response = builder.send().await?;
        Self::handle_response(response).await
    }

    /// Sends up to [`BATCH_LIMIT`] requests as one multipart call. Each reply
    /// carries the caller-supplied id of the request it answers; replies may
    /// come back in any order.
    pub async fn execute_batch(
        &self,
        requests: &[(String, ApiRequest)],
    ) -> Result<Vec<BatchReply>, DriveError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if requests.len() > BATCH_LIMIT {
            return Err(DriveError::BatchTooLarge(requests.len()));
        }

        let mut lines = Vec::with_capacity(requests.len());
        for (_, request) in requests {
            if matches!(request, ApiRequest::Create(_)) {
                return Err(DriveError::Unbatchable("media upload"));
            }
            lines.push(self.prepare(request)?.request_line());
        }

        let boundary = new_boundary("batch");
        let url = self.endpoint("/batch/drive/v3")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header(
                CONTENT_TYPE,
                format!("multipart/mixed; boundary={boundary}"),
            )
            .body(batch::encode(&lines, &boundary))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        let mut replies = Vec::with_capacity(requests.len());
        for part in batch::decode(&content_type, &body)? {
            let (id, _) = requests.get(part.index).ok_or_else(|| {
                DriveError::MalformedBatch(format!("unknown content id item-{}", part.index))
            })?;
            let result = if part.status.is_success() {
                parse_payload(part.body.as_bytes())
            } else {
                Err(api_error(part.status, &part.body))
            };
            replies.push(BatchReply {
                id: id.clone(),
                result,
            });
        }
        Ok(replies)
    }

    fn prepare(&self, request: &ApiRequest) -> Result<HttpCall, DriveError> {
        match request {
            ApiRequest::Get { file_id, fields } => {
                let mut url = self.file_url(file_id)?;
                if !fields.is_empty() {
                    url.query_pairs_mut().append_pair("fields", &fields.join(","));
                }
                Ok(HttpCall {
                    method: Method::GET,
                    url,
                    body: None,
                })
            }
            ApiRequest::List {
                query,
                page_size,
                page_token,
                fields,
            } => {
                let mut url = self.endpoint("/drive/v3/files")?;
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs.append_pair("q", query);
                    pairs.append_pair("pageSize", &page_size.to_string());
                    if let Some(token) = page_token {
                        pairs.append_pair("pageToken", token);
                    }
                    if !fields.is_empty() {
                        pairs.append_pair("fields", &fields.join(","));
                    }
                }
                Ok(HttpCall {
                    method: Method::GET,
                    url,
                    body: None,
                })
            }
            ApiRequest::Delete { file_id } => Ok(HttpCall {
                method: Method::DELETE,
                url: self.file_url(file_id)?,
                body: None,
            }),
            ApiRequest::Create(upload) => {
                let mut url = self.endpoint("/upload/drive/v3/files")?;
                url.query_pairs_mut()
                    .append_pair("uploadType", "multipart")
                    .append_pair("fields", "id");
                let boundary = new_boundary("upload");
                let body = multipart_related(upload, &boundary)?;
                Ok(HttpCall {
                    method: Method::POST,
                    url,
                    body: Some((format!("multipart/related; boundary={boundary}"), body)),
                })
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    fn file_url(&self, file_id: &str) -> Result<Url, DriveError> {
        let mut url = self.endpoint("/drive/v3/files")?;
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(file_id);
        }
        Ok(url)
    }

    async fn handle_response(response: reqwest::Response) -> Result<Value, DriveError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            parse_payload(&bytes)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(api_error(status, &body))
        }
    }
}

fn parse_payload(bytes: &[u8]) -> Result<Value, DriveError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(bytes)?)
}

fn multipart_related(upload: &FileUpload, boundary: &str) -> Result<Vec<u8>, DriveError> {
    let metadata = serde_json::to_string(&serde_json::json!({
        "name": upload.name,
        "parents": upload.parents,
        "mimeType": upload.mime_type,
    }))?;
    let mut body = Vec::with_capacity(upload.body.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Type: {}\r\n\r\n",
            upload.mime_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(&upload.body);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Ok(body)
}

fn new_boundary(kind: &str) -> String {
    format!("drivesync_{kind}_{:016x}", rand::thread_rng().r#gen::<u64>())
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) fn api_error(status: StatusCode, body: &str) -> DriveError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => DriveError::Api {
            status,
            reason: parsed
                .error
                .errors
                .into_iter()
                .next()
                .and_then(|item| item.reason),
            message: parsed.error.message.unwrap_or_else(|| body.to_string()),
        },
        Err(_) => DriveError::Api {
            status,
            reason: None,
            message: body.to_string(),
        },
    }
}
