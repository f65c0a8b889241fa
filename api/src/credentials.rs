use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Cached tokens are dropped this long before the issuer's expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// How requests to the vision backend are authorized.
#[derive(Clone)]
pub enum Credentials {
    /// Sent as the `key` query parameter.
    ApiKey(String),
    /// Sent as `Authorization: Bearer <token>`.
    AccessToken(String),
    /// A service-account key; access tokens are minted from a signed JWT
    /// and reused until shortly before they expire.
    ServiceAccount(Arc<ServiceAccount>),
}

/// On-disk key file. Either a plain `{api_key}` / `{access_token}` file or
/// a cloud service-account key (`client_email`, `private_key`, `token_uri`).
/// Precedence: `api_key`, then `access_token`, then the service account.
#[derive(Debug, Deserialize)]
struct KeyFile {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    client_email: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, CredentialsError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CredentialsError::NotFound(path.to_path_buf()),
            _ => CredentialsError::Read(path.to_path_buf(), e),
        })?;
        let file: KeyFile = serde_json::from_str(&content)
            .map_err(|e| CredentialsError::Parse(path.to_path_buf(), e.to_string()))?;

        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(key) = non_empty(file.api_key) {
            return Ok(Self::ApiKey(key));
        }
        if let Some(token) = non_empty(file.access_token) {
            return Ok(Self::AccessToken(token));
        }
        if let (Some(email), Some(pem)) = (non_empty(file.client_email), non_empty(file.private_key)) {
            let token_uri = non_empty(file.token_uri).unwrap_or_else(|| DEFAULT_TOKEN_URI.into());
            let account = ServiceAccount::new(email, &pem, token_uri)
                .map_err(|e| CredentialsError::PrivateKey(path.to_path_buf(), e))?;
            return Ok(Self::ServiceAccount(Arc::new(account)));
        }
        Err(CredentialsError::Empty(path.to_path_buf()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::AccessToken(_) => "access_token",
            Self::ServiceAccount(_) => "service_account",
        }
    }

    pub(crate) async fn authorize(
        &self,
        http: &reqwest::Client,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CredentialsError> {
        Ok(match self {
            Self::ApiKey(key) => req.query(&[("key", key)]),
            Self::AccessToken(token) => req.bearer_auth(token),
            Self::ServiceAccount(account) => req.bearer_auth(account.access_token(http).await?),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials({}: <redacted>)", self.kind())
    }
}

// ---------------------------------------------------------------------------
// Service account
// ---------------------------------------------------------------------------

pub struct ServiceAccount {
    client_email: String,
    key: EncodingKey,
    token_uri: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl ServiceAccount {
    fn new(client_email: String, private_key_pem: &str, token_uri: String) -> Result<Self, String> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| e.to_string())?;
        Ok(Self {
            client_email,
            key,
            token_uri,
            cached: Mutex::new(None),
        })
    }

    /// A valid access token, minting a new one when the cached token is
    /// missing or about to expire. Concurrent callers share one mint.
    async fn access_token(&self, http: &reqwest::Client) -> Result<String, CredentialsError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if Instant::now() < current.refresh_at {
                return Ok(current.token.clone());
            }
            debug!(client_email = self.client_email, "access token expiring, refreshing");
        }

        let minted = self.mint(http).await?;
        let lifetime = Duration::from_secs(minted.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS as u64));
        *cached = Some(CachedToken {
            token: minted.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        });
        Ok(minted.access_token)
    }

    async fn mint(&self, http: &reqwest::Client) -> Result<TokenResponse, CredentialsError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope: SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| CredentialsError::Sign(e.to_string()))?;

        let resp = http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| CredentialsError::TokenRequest(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CredentialsError::TokenStatus(status.as_u16(), body));
        }
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialsError::TokenRequest(e.to_string()))?;
        info!(
            client_email = self.client_email,
            expires_in = ?token.expires_in,
            "vision access token minted"
        );
        Ok(token)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("credentials file {0} does not exist")]
    NotFound(PathBuf),
    #[error("failed to read credentials file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("failed to parse credentials file {0}: {1}")]
    Parse(PathBuf, String),
    #[error("credentials file {0} has no `api_key`, `access_token` or service-account key")]
    Empty(PathBuf),
    #[error("invalid service-account private key in {0}: {1}")]
    PrivateKey(PathBuf, String),
    #[error("failed to sign token request: {0}")]
    Sign(String),
    #[error("token request failed: {0}")]
    TokenRequest(String),
    #[error("token endpoint returned HTTP {0}: {1}")]
    TokenStatus(u16, String),
}
