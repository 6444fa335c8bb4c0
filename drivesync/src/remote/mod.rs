//! Execution of remote operations: batching, error policies and retries.

pub mod executor;
pub mod operation;
pub mod policy;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use executor::{BatchExecutor, Strategy};
pub use operation::{Operation, OperationError, Outcome, Producer, RemoteService};
pub use policy::{Action, ErrorPolicy, PolicyTable};
pub use runner::{Completed, ResilientRunner, RunnerConfig, RunnerError};
