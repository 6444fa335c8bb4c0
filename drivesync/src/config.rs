use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::drive::DEFAULT_PAGE_SIZE;
use crate::remote::RunnerConfig;
use crate::remote::runner::{DEFAULT_MAX_RETRIES, DEFAULT_MIN_BACKOFF};

const CONFIG_DIR_NAME: &str = "drivesync";
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Raw access token that bypasses stored credentials.
    pub token: Option<String>,
    pub credentials_path: PathBuf,
    pub runner: RunnerConfig,
    pub page_size: u32,
    pub api_base: Option<String>,
    pub oauth_base: Option<String>,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let credentials_path = match non_empty("DRIVESYNC_CREDENTIALS") {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .context("config directory is unavailable")?
                .join(CONFIG_DIR_NAME)
                .join(CREDENTIALS_FILE),
        };

        let runner = RunnerConfig {
            min_backoff: Duration::from_secs(read_u64(
                &lookup,
                "DRIVESYNC_MIN_BACKOFF_SECS",
                DEFAULT_MIN_BACKOFF.as_secs(),
            )),
            max_retries: read_u64(
                &lookup,
                "DRIVESYNC_MAX_RETRIES",
                u64::from(DEFAULT_MAX_RETRIES),
            )
            .try_into()
            .unwrap_or(DEFAULT_MAX_RETRIES),
            timeout: lookup("DRIVESYNC_TIMEOUT_SECS")
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };
        let page_size = read_u64(&lookup, "DRIVESYNC_PAGE_SIZE", u64::from(DEFAULT_PAGE_SIZE))
            .try_into()
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Ok(Self {
            client_id: non_empty("DRIVESYNC_CLIENT_ID"),
            client_secret: non_empty("DRIVESYNC_CLIENT_SECRET"),
            token: non_empty("DRIVESYNC_TOKEN"),
            credentials_path,
            runner,
            page_size,
            api_base: non_empty("DRIVESYNC_API_BASE"),
            oauth_base: non_empty("DRIVESYNC_OAUTH_BASE"),
        })
    }
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
