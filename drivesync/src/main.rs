use anyhow::Context;
use clap::Parser;
use drivesync::auth::{Authenticator, Authorization, CredentialStore};
use drivesync::cli::{Cli, Command, SyncSubcommand};
use drivesync::commands::{CommandError, dedup, snapshot, sync};
use drivesync::config::SyncConfig;
use drivesync::drive::DriveTree;
use drivesync::logging::init_logging;
use gdrive_core::{DriveClient, OAuthClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

/// Exit status for inconsistent data or arguments.
const STRUCTURAL_FAILURE: i32 = -1;
const FAILURE: i32 = 1;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(err) = init_logging() {
        eprintln!("drivesync: {err}");
        std::process::exit(FAILURE);
    }
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = SyncConfig::from_env()?;
    if let Command::Logout = cli.command {
        let store = CredentialStore::new(&config.credentials_path);
        if store.delete()? {
            info!("Removed stored credentials {}", store.path().display());
        } else {
            info!("No stored credentials to remove");
        }
        return Ok(());
    }

    let client = connect(&config).await?;
    let tree = DriveTree::new(&client)
        .with_runner_config(config.runner)
        .with_page_size(config.page_size);

    match cli.command {
        Command::Snapshot(args) => snapshot::run(&tree, &args).await?,
        Command::Dedup(args) => dedup::run(&tree, &args).await?,
        Command::Sync(command) => {
            let working_dir = std::env::current_dir().context("current directory is unavailable")?;
            match command.command {
                Some(SyncSubcommand::Resume { clear }) => {
                    sync::resume(&tree, &working_dir, clear).await?;
                }
                None => {
                    let args = command
                        .args
                        .into_sync_args()
                        .context("sync needs a local folder and a Google Drive folder")?;
                    sync::start(&tree, args, &working_dir).await?;
                }
            }
        }
        Command::Logout => {}
    }
    Ok(())
}

async fn connect(config: &SyncConfig) -> anyhow::Result<DriveClient> {
    if let Some(token) = &config.token {
        debug!("using access token from DRIVESYNC_TOKEN");
        return Ok(match &config.api_base {
            Some(base) => DriveClient::with_base_url(base, token.clone())?,
            None => DriveClient::new(token.clone())?,
        });
    }

    let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret) else {
        anyhow::bail!("DRIVESYNC_CLIENT_ID and DRIVESYNC_CLIENT_SECRET must be set to sign in");
    };
    let oauth = match &config.oauth_base {
        Some(base) => OAuthClient::with_base_url(base, client_id.clone(), client_secret.clone())?,
        None => OAuthClient::new(client_id.clone(), client_secret.clone())?,
    };
    let auth = Authenticator::new(oauth, CredentialStore::new(&config.credentials_path))
        .with_api_base(config.api_base.clone());

    match auth.connect().await? {
        Authorization::Authorized(client) => Ok(client),
        Authorization::NeedsAuthorization { prompt_url } => {
            eprintln!("Go to the following link in your browser:\n\n    {prompt_url}\n");
            eprint!("Enter verification code: ");
            let mut code = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut code)
                .await
                .context("failed to read verification code")?;
            Ok(auth.authorize(&code).await?)
        }
    }
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let structural = err.chain().any(|cause| {
        cause
            .downcast_ref::<CommandError>()
            .is_some_and(CommandError::is_structural)
    });
    if structural { STRUCTURAL_FAILURE } else { FAILURE }
}
