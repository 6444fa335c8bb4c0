use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid DRIVESYNC_LOG directives: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Events go to stderr so stdout only ever
/// carries command output such as JSON listings.
pub fn init_logging() -> Result<(), LoggingError> {
    let filter = build_filter(std::env::var("DRIVESYNC_LOG").ok())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish()
        .try_init()?;
    Ok(())
}

/// `DRIVESYNC_LOG` wins over `RUST_LOG`; a malformed `RUST_LOG` falls back
/// to the default level.
fn build_filter(directives: Option<String>) -> Result<EnvFilter, LoggingError> {
    match directives {
        Some(directives) => Ok(EnvFilter::try_new(directives)?),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}
