//! OAuth2 installed-application flow for the Google Calendar API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::errors::{DonnaError, DonnaResult};

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

const SERVICE: &str = "google";
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// The `installed` (or `web`) block of a Google client secrets file
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ClientSecrets {
    pub async fn load(path: &Path) -> DonnaResult<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            DonnaError::config(format!(
                "Cannot read Google client secrets at {}: {}. Download an OAuth client (Desktop app) from the Google console.",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> DonnaResult<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| DonnaError::config("client secrets file has neither an 'installed' nor a 'web' section"))
    }

    fn oauth_client(&self) -> DonnaResult<BasicClient> {
        Ok(BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            AuthUrl::new(self.auth_uri.clone())?,
            Some(TokenUrl::new(self.token_uri.clone())?),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl StoredToken {
    /// Usable for at least the next few minutes; tokens without expiry never expire
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::minutes(EXPIRY_SKEW_MINUTES) < expires_at,
            None => true,
        }
    }

    fn from_response<T: TokenResponse<oauth2::basic::BasicTokenType>>(response: &T, previous_refresh: Option<String>) -> Self {
        Self {
            access_token: response.access_token().secret().clone(),
            // Google omits the refresh token on refresh; keep the old one
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(previous_refresh),
            expires_at: response
                .expires_in()
                .and_then(|d| Duration::from_std(d).ok())
                .map(|d| Utc::now() + d),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }
}

/// Token file on disk, overwritten on every refresh
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no token has been stored yet
    pub async fn load(&self) -> DonnaResult<Option<StoredToken>> {
        match fs::read_to_string(&self.path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DonnaError::file_system("read token", &self.path, e)),
        }
    }

    pub async fn store(&self, token: &StoredToken) -> DonnaResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DonnaError::file_system("create token directory", parent, e))?;
        }

        let token_json = serde_json::to_string_pretty(token)?;
        fs::write(&self.path, token_json)
            .await
            .map_err(|e| DonnaError::file_system("write token", &self.path, e))?;
        debug!("Stored Google Calendar token to {:?}", self.path);
        Ok(())
    }
}

/// Source of bearer tokens for calendar API requests
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> DonnaResult<String>;
}

/// A fixed token, for pre-authorized environments and tests
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> DonnaResult<String> {
        Ok(self.0.clone())
    }
}

/// Produces a valid access token: stored, refreshed, or freshly authorized
pub struct GoogleAuthenticator {
    secrets: ClientSecrets,
    store: TokenStore,
}

impl GoogleAuthenticator {
    pub fn new(secrets: ClientSecrets, store: TokenStore) -> Self {
        Self { secrets, store }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Stored token state without touching the network
    pub async fn status(&self) -> DonnaResult<Option<StoredToken>> {
        self.store.load().await
    }

    /// Get a valid access token, refreshing or logging in if necessary
    pub async fn valid_token(&self) -> DonnaResult<String> {
        if let Some(token) = self.store.load().await? {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.access_token);
            }

            if token.refresh_token.is_some() {
                debug!("Access token expired, refreshing...");
                match self.refresh(&token).await {
                    Ok(refreshed) => return Ok(refreshed.access_token),
                    Err(e) => warn!("Token refresh failed, falling back to interactive login: {}", e),
                }
            }
        }

        Ok(self.login().await?.access_token)
    }

    /// Refresh expired access token
    pub async fn refresh(&self, current: &StoredToken) -> DonnaResult<StoredToken> {
        let refresh_token = current
            .refresh_token
            .as_ref()
            .ok_or_else(|| DonnaError::auth(SERVICE, "No refresh token available"))?;

        let response = self
            .secrets
            .oauth_client()?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| DonnaError::auth(SERVICE, format!("Failed to refresh token: {}", e)))?;

        let token = StoredToken::from_response(&response, Some(refresh_token.clone()));
        self.store.store(&token).await?;
        info!("Google Calendar token refreshed successfully");
        Ok(token)
    }

    /// Interactive authorization-code flow with a loopback redirect
    pub async fn login(&self) -> DonnaResult<StoredToken> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);

        let client = self
            .secrets
            .oauth_client()?
            .set_redirect_uri(RedirectUrl::new(redirect_uri)?);
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_token) = client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new(CALENDAR_SCOPE.to_string()))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        println!("🔐 Google Calendar authorization required");
        println!("Open this URL in your browser and grant access:");
        println!("   {}", auth_url);
        info!("Waiting for OAuth redirect on port {}", port);

        let callback = wait_for_callback(&listener).await?;
        if callback.state.as_deref() != Some(csrf_token.secret().as_str()) {
            return Err(DonnaError::auth(SERVICE, "OAuth state mismatch, possible CSRF"));
        }
        let code = callback
            .code
            .ok_or_else(|| DonnaError::auth(SERVICE, callback.error.unwrap_or_else(|| "no authorization code".to_string())))?;

        debug!("Exchanging authorization code (length {}) for access token", code.len());
        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| DonnaError::auth(SERVICE, format!("Code exchange failed: {}", e)))?;

        let token = StoredToken::from_response(&response, None);
        self.store.store(&token).await?;
        info!("Google Calendar authentication successful");
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for GoogleAuthenticator {
    async fn access_token(&self) -> DonnaResult<String> {
        self.valid_token().await
    }
}

#[derive(Debug, Default, PartialEq)]
struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Accept one browser redirect and answer it with a short page
async fn wait_for_callback(listener: &TcpListener) -> DonnaResult<OAuthCallback> {
    let (mut stream, peer) = listener.accept().await?;
    debug!("OAuth redirect received from {}", peer);

    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        reader.read_line(&mut request_line).await?;
    }

    let callback = parse_callback_request(&request_line)?;
    let body = if callback.code.is_some() {
        "Authentication complete. You can close this window."
    } else {
        "Authentication failed. Check the terminal for details."
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(callback)
}

/// Pull `code`, `state` and `error` out of `GET /?code=..&state=.. HTTP/1.1`
fn parse_callback_request(request_line: &str) -> DonnaResult<OAuthCallback> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| DonnaError::auth(SERVICE, format!("Malformed OAuth redirect: {:?}", request_line.trim())))?;
    let url = oauth2::url::Url::parse(&format!("http://localhost{}", target))?;

    let mut callback = OAuthCallback::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => callback.code = Some(value.into_owned()),
            "state" => callback.state = Some(value.into_owned()),
            "error" => callback.error = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(callback)
}
