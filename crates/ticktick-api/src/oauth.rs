//! OAuth2 authorization-code flow and token storage.
//!
//! TickTick uses a plain authorization-code grant: the token endpoint
//! takes the client credentials via HTTP basic auth and form-encoded
//! parameters. Tokens are held behind an async lock so a refresh can
//! swap them without interrupting in-flight requests.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use ticktick_core::config::Config;
use ticktick_core::{Error, Result};

/// OAuth scope requested during authorization.
pub const SCOPE: &str = "tasks:read tasks:write";

/// A token pair as returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Client for the TickTick OAuth endpoints.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    auth_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            http: reqwest::Client::builder()
                .user_agent("ticktick-tools")
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Build an OAuth client from config, failing if the app
    /// credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client_id = config.oauth.client_id.clone().ok_or_else(|| {
            Error::Config(
                "oauth.client_id is not set. Run: ticktick config set oauth.client_id <id>"
                    .to_string(),
            )
        })?;
        let client_secret = config.oauth.client_secret.clone().ok_or_else(|| {
            Error::Config(
                "oauth.client_secret is not set. Run: ticktick config set oauth.client_secret <secret>"
                    .to_string(),
            )
        })?;
        Ok(Self::new(
            &config.oauth.auth_url,
            &config.oauth.token_url,
            client_id,
            client_secret,
        ))
    }

    /// The URL the user opens in a browser to grant access.
    pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> String {
        format!(
            "{}?client_id={}&scope={}&state={}&redirect_uri={}&response_type=code",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(SCOPE),
            urlencoding::encode(state),
            urlencoding::encode(redirect_uri),
        )
    }

    /// Exchange an authorization code for a token pair.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<AccessToken> {
        debug!(url = %self.token_url, "exchanging authorization code");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::parse_token_response(response).await
    }

    /// Trade a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
        debug!(url = %self.token_url, "refreshing access token");
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", SCOPE),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::parse_token_response(response).await
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<AccessToken> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), message, "token endpoint error");
            return Err(Error::Auth(format!(
                "token request failed with status {}: {}",
                status.as_u16(),
                message
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to parse token response: {}", e)))
    }
}

/// Holds the current token pair and knows how to renew and persist it.
///
/// The token is swapped in memory only after persistence succeeds, so a
/// failed write never leaves disk and memory disagreeing.
pub struct CredentialProvider {
    oauth: Option<OAuthClient>,
    config_path: Option<PathBuf>,
    current: RwLock<AccessToken>,
}

impl CredentialProvider {
    /// Provider that can refresh and persist.
    pub fn new(oauth: OAuthClient, token: AccessToken, config_path: Option<PathBuf>) -> Self {
        Self {
            oauth: Some(oauth),
            config_path,
            current: RwLock::new(token),
        }
    }

    /// Provider for a fixed token (e.g. from an environment variable).
    /// Refresh attempts fail with an auth error.
    pub fn fixed(access_token: impl Into<String>) -> Self {
        Self {
            oauth: None,
            config_path: None,
            current: RwLock::new(AccessToken {
                access_token: access_token.into(),
                refresh_token: None,
            }),
        }
    }

    /// Current bearer token.
    pub async fn token(&self) -> String {
        self.current.read().await.access_token.clone()
    }

    /// Renew the token pair via the refresh grant and persist it.
    pub async fn refresh(&self) -> Result<()> {
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            Error::Auth(
                "access token rejected and no refresh is possible. Run `ticktick auth` to log in again"
                    .to_string(),
            )
        })?;
        let refresh_token = {
            let current = self.current.read().await;
            current.refresh_token.clone().ok_or_else(|| {
                Error::Auth(
                    "access token rejected and no refresh token is stored. Run `ticktick auth` to log in again"
                        .to_string(),
                )
            })?
        };

        let mut renewed = oauth.refresh(&refresh_token).await?;
        // Some token endpoints omit the refresh token on renewal; keep
        // the old one in that case.
        if renewed.refresh_token.is_none() {
            renewed.refresh_token = Some(refresh_token);
        }

        if let Some(path) = &self.config_path {
            let mut config = Config::load_from(path)?;
            config.oauth.access_token = Some(renewed.access_token.clone());
            config.oauth.refresh_token = renewed.refresh_token.clone();
            config.save_to(path)?;
        }

        *self.current.write().await = renewed;
        info!("access token refreshed");
        Ok(())
    }
}
