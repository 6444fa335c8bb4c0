//! Sign-in as a two step protocol.
//!
//! [`Authenticator::connect`] either yields a ready client or the URL the user
//! has to visit. The code shown there is passed to
//! [`Authenticator::authorize`], which exchanges it and stores the credentials.

pub mod credentials;
pub mod token_provider;

use std::io;
use std::path::PathBuf;

use gdrive_core::{DRIVE_SCOPE, DriveClient, DriveError, OAuthClient, OAuthError, OOB_REDIRECT_URI};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub use credentials::{CredentialStore, OAuthState};
pub use token_provider::{TokenProvider, TokenProviderError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials I/O failed for {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid credentials file {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Token(#[from] TokenProviderError),
    #[error(transparent)]
    Drive(#[from] DriveError),
}

pub enum Authorization {
    /// The user must open `prompt_url` and paste back the code it shows.
    NeedsAuthorization { prompt_url: Url },
    Authorized(DriveClient),
}

pub struct Authenticator {
    oauth: OAuthClient,
    store: CredentialStore,
    api_base: Option<String>,
}

impl Authenticator {
    pub fn new(oauth: OAuthClient, store: CredentialStore) -> Self {
        Self {
            oauth,
            store,
            api_base: None,
        }
    }

    pub fn with_api_base(mut self, api_base: Option<String>) -> Self {
        self.api_base = api_base;
        self
    }

    pub async fn connect(&self) -> Result<Authorization, AuthError> {
        let Some(state) = self.store.load()? else {
            let prompt_url = self
                .oauth
                .authorize_url(OOB_REDIRECT_URI, Some(DRIVE_SCOPE), None)?;
            return Ok(Authorization::NeedsAuthorization { prompt_url });
        };

        let mut provider = TokenProvider::new(state, Some(self.oauth.clone()));
        let token = provider.valid_access_token().await?;
        if provider.was_refreshed() {
            debug!("access token refreshed");
            self.store.save(provider.state())?;
        }
        Ok(Authorization::Authorized(self.client(token)?))
    }

    pub async fn authorize(&self, code: &str) -> Result<DriveClient, AuthError> {
        let token = self
            .oauth
            .exchange_code(code.trim(), Some(OOB_REDIRECT_URI))
            .await?;
        let state = OAuthState::from_oauth_token(&token);
        self.store.save(&state)?;
        info!("Credentials stored at {}", self.store.path().display());
        self.client(state.access_token)
    }

    fn client(&self, token: String) -> Result<DriveClient, AuthError> {
        Ok(match &self.api_base {
            Some(base) => DriveClient::with_base_url(base, token)?,
            None => DriveClient::new(token)?,
        })
    }
}
