//! OAuth2 access tokens for the Firestore REST API.
//!
//! Three credential sources are supported:
//!
//! - a service account (client email plus PEM private key), exchanged for
//!   an access token with a signed RS256 JWT bearer assertion
//! - the GCE metadata server, for workloads running on Google Cloud
//! - none, for the local emulator, which accepts unauthenticated requests
//!
//! Tokens are cached until shortly before they expire.

use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use knowdose_storage::StorageError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Google's OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Metadata server endpoint that hands out the default service account token.
pub const DEFAULT_METADATA_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// OAuth2 scope granting Firestore access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from.
#[derive(Clone)]
pub enum Credentials {
    /// Unauthenticated access (emulator).
    None,
    /// Service account key.
    ServiceAccount {
        client_email: String,
        private_key: String,
        token_url: String,
    },
    /// GCE metadata server.
    Metadata { url: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .field("private_key", &"[REDACTED]")
                .finish(),
            Self::Metadata { url } => f.debug_struct("Metadata").field("url", url).finish(),
        }
    }
}

impl Credentials {
    /// Service account credentials against Google's token endpoint.
    ///
    /// Literal `\n` sequences in the key are turned into newlines, since keys
    /// passed through environment variables usually arrive escaped.
    #[must_use]
    pub fn service_account(client_email: impl Into<String>, private_key: &str) -> Self {
        Self::ServiceAccount {
            client_email: client_email.into(),
            private_key: private_key.replace("\\n", "\n"),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Metadata server credentials.
    #[must_use]
    pub fn metadata() -> Self {
        Self::Metadata {
            url: DEFAULT_METADATA_URL.to_string(),
        }
    }

    /// Overrides the endpoint tokens are fetched from.
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        match &mut self {
            Self::ServiceAccount { token_url, .. } => *token_url = url.into(),
            Self::Metadata { url: current } => *current = url.into(),
            Self::None => {}
        }
        self
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Produces bearer tokens for Firestore requests, caching them.
pub struct TokenProvider {
    http: reqwest::Client,
    credentials: Credentials,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            cached: RwLock::new(None),
        }
    }

    /// Returns the bearer token to attach, or `None` for unauthenticated access.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConnectionError` if the token cannot be obtained.
    pub async fn bearer(&self) -> Result<Option<String>, StorageError> {
        if matches!(self.credentials, Credentials::None) {
            return Ok(None);
        }

        if let Some(token) = self.cached.read().await.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(Some(token.value.clone()));
        }

        let mut slot = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(Some(token.value.clone()));
        }

        let response = self.fetch().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let token = CachedToken {
            value: response.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        };
        tracing::debug!(expires_in = lifetime.as_secs(), "Obtained Firestore access token");
        let value = token.value.clone();
        *slot = Some(token);
        Ok(Some(value))
    }

    async fn fetch(&self) -> Result<TokenResponse, StorageError> {
        let request = match &self.credentials {
            Credentials::None => {
                return Err(StorageError::internal("no credentials configured"));
            }
            Credentials::ServiceAccount {
                client_email,
                private_key,
                token_url,
            } => {
                let assertion = sign_assertion(client_email, private_key, token_url)?;
                self.http
                    .post(token_url)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
            Credentials::Metadata { url } => {
                self.http.get(url).header("Metadata-Flavor", "Google")
            }
        };

        let response = request.send().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to reach token endpoint");
            StorageError::connection_error(format!("token request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Token endpoint rejected request");
            return Err(StorageError::connection_error(format!(
                "token endpoint returned {status}"
            )));
        }

        response.json::<TokenResponse>().await.map_err(|e| {
            StorageError::connection_error(format!("invalid token response: {e}"))
        })
    }
}

/// Signs the JWT bearer assertion for a service account.
fn sign_assertion(
    client_email: &str,
    private_key: &str,
    audience: &str,
) -> Result<String, StorageError> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| StorageError::connection_error(format!("invalid private key: {e}")))?;

    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    let claims = AssertionClaims {
        iss: client_email,
        scope: DATASTORE_SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| StorageError::connection_error(format!("failed to sign assertion: {e}")))
}
