use std::collections::HashSet;
use std::time::Duration;

use gdrive_core::DriveError;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::executor::{BatchExecutor, Strategy};
use super::operation::{Operation, OperationError, Outcome, RemoteService};
use super::policy::{Action, PolicyTable};

pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("request {id} failed: {source}")]
    Unrecoverable {
        id: String,
        #[source]
        source: DriveError,
    },
    #[error(transparent)]
    Drive(#[from] DriveError),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error("operation id {0} is already queued")]
    DuplicateId(String),
    #[error("service answered for unknown operation {0}")]
    UnknownOutcome(String),
    #[error("too many retry attempts ({attempts}), giving up")]
    TooManyAttempts { attempts: u32 },
    #[error("timed out after {0:?} with requests still pending")]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    pub min_backoff: Duration,
    pub max_retries: u32,
    pub timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
        }
    }
}

/// A successful operation and the payload the service returned for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub id: String,
    pub payload: Value,
}

/// Runs queued operations in repeated passes until all of them succeed or
/// are skipped, consulting the policy table for every failure.
///
/// Retries cover the whole remaining set per pass, so operations that failed
/// in different chunks are retried together. Any success resets the attempt
/// counter and the backoff.
pub struct ResilientRunner<'s, S> {
    service: &'s S,
    strategy: Strategy,
    policies: PolicyTable,
    config: RunnerConfig,
    pending: Vec<(String, Operation)>,
    ids: HashSet<String>,
}

impl<'s, S: RemoteService> ResilientRunner<'s, S> {
    pub fn new(service: &'s S, strategy: Strategy) -> Self {
        Self {
            service,
            strategy,
            policies: PolicyTable::defaults(),
            config: RunnerConfig::default(),
            pending: Vec::new(),
            ids: HashSet::new(),
        }
    }

    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn add(&mut self, id: impl Into<String>, operation: Operation) -> Result<(), RunnerError> {
        let id = id.into();
        if !self.ids.insert(id.clone()) {
            return Err(RunnerError::DuplicateId(id));
        }
        self.pending.push((id, operation));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Executes everything and collects the completed operations.
    pub async fn execute(self) -> Result<Vec<Completed>, RunnerError> {
        let mut completed = Vec::new();
        self.execute_with(|done| completed.push(done)).await?;
        Ok(completed)
    }

    /// Executes everything, handing each success to `on_complete` as soon as
    /// it arrives. Skipped operations produce no callback.
    pub async fn execute_with<F>(mut self, mut on_complete: F) -> Result<(), RunnerError>
    where
        F: FnMut(Completed),
    {
        let started = Instant::now();
        let min_backoff = self.config.min_backoff;
        let mut attempts: u32 = 1;
        let mut backoff = min_backoff;
        let mut warned: HashSet<String> = HashSet::new();

        while !self.pending.is_empty() {
            if attempts > self.config.max_retries {
                return Err(RunnerError::TooManyAttempts {
                    attempts: self.config.max_retries,
                });
            }
            if let Some(timeout) = self.config.timeout {
                if started.elapsed() >= timeout {
                    return Err(RunnerError::TimedOut(timeout));
                }
            }

            debug!(
                pending = self.pending.len(),
                attempt = attempts,
                "running pass"
            );
            let mut resolved: HashSet<String> = HashSet::new();
            let mut progressed = false;
            let executor = BatchExecutor::new(self.service, self.strategy);
            let ids = &self.ids;
            let policies = &self.policies;

            executor
                .run(&self.pending, |outcome: Outcome| {
                    if !ids.contains(&outcome.id) || resolved.contains(&outcome.id) {
                        return Err(RunnerError::UnknownOutcome(outcome.id));
                    }
                    let error = match outcome.result {
                        Ok(payload) => {
                            progressed = true;
                            resolved.insert(outcome.id.clone());
                            on_complete(Completed {
                                id: outcome.id,
                                payload,
                            });
                            return Ok(());
                        }
                        Err(error) => error,
                    };

                    let Some(signature) = error.signature() else {
                        return Err(RunnerError::Unrecoverable {
                            id: outcome.id,
                            source: error,
                        });
                    };
                    let Some(policy) = policies.matching(&signature) else {
                        return Err(RunnerError::Unrecoverable {
                            id: outcome.id,
                            source: error,
                        });
                    };

                    let first_for_code = warned.insert(signature.code.clone());
                    if policy.always_warn || first_for_code {
                        warn!("{}", policy.warning_for(&outcome.id));
                    }

                    match policy.action {
                        Action::Retry => Ok(()),
                        Action::Skip => {
                            resolved.insert(outcome.id);
                            Ok(())
                        }
                        Action::Fail => Err(RunnerError::Unrecoverable {
                            id: outcome.id,
                            source: error,
                        }),
                    }
                })
                .await?;

            self.pending.retain(|(id, _)| !resolved.contains(id));
            for id in &resolved {
                self.ids.remove(id);
            }
            if self.pending.is_empty() {
                break;
            }

            if progressed {
                attempts = 1;
                backoff = min_backoff;
            }
            warn!("Some of the requests could not be fulfilled. Backing off and retrying.");
            sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
            attempts += 1;
        }
        Ok(())
    }
}
