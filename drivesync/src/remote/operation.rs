use std::fmt;
use std::future::Future;
use std::io;

use gdrive_core::{ApiRequest, BatchReply, DriveClient, DriveError};
use serde_json::Value;
use thiserror::Error;

/// Produces a request at execution time. Called once per attempt.
pub type Producer = Box<dyn Fn() -> io::Result<ApiRequest> + Send + Sync>;

/// A unit of work against the remote service. Carries no retry logic.
pub enum Operation {
    Ready(ApiRequest),
    /// The request is only built when the executor reaches it, so large
    /// upload bodies are never buffered for a whole queue.
    Deferred(Producer),
}

impl Operation {
    pub fn ready(request: ApiRequest) -> Self {
        Operation::Ready(request)
    }

    pub fn deferred<F>(producer: F) -> Self
    where
        F: Fn() -> io::Result<ApiRequest> + Send + Sync + 'static,
    {
        Operation::Deferred(Box::new(producer))
    }

    pub fn materialize(&self) -> io::Result<ApiRequest> {
        match self {
            Operation::Ready(request) => Ok(request.clone()),
            Operation::Deferred(producer) => producer(),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Ready(request) => f.debug_tuple("Ready").field(request).finish(),
            Operation::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("failed to prepare operation {id}: {source}")]
    Prepare {
        id: String,
        #[source]
        source: io::Error,
    },
}

/// Result of executing one operation: a payload or the error it hit.
#[derive(Debug)]
pub struct Outcome {
    pub id: String,
    pub result: Result<Value, DriveError>,
}

/// The RPC capability the executors run operations against.
pub trait RemoteService {
    fn call(&self, request: ApiRequest) -> impl Future<Output = Result<Value, DriveError>>;

    /// Submits several requests in one physical call. Replies may arrive in
    /// any order and are keyed by the ids supplied with the requests.
    fn call_batch(
        &self,
        requests: Vec<(String, ApiRequest)>,
    ) -> impl Future<Output = Result<Vec<BatchReply>, DriveError>>;
}

impl RemoteService for DriveClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, DriveError> {
        self.execute(&request).await
    }

    async fn call_batch(
        &self,
        requests: Vec<(String, ApiRequest)>,
    ) -> Result<Vec<BatchReply>, DriveError> {
        self.execute_batch(&requests).await
    }
}
