use std::time::Duration;

use crate::auth::Credentials;

/// Production Firestore endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com";

/// Connection settings for [`crate::FirestoreStore`].
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    pub project_id: String,

    /// Database id, `(default)` unless a named database is used.
    pub database_id: String,

    /// Scheme and host of the REST API.
    pub endpoint: String,

    /// Where access tokens come from.
    pub credentials: Credentials,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,
}

impl FirestoreConfig {
    /// Production endpoint using the metadata server for tokens.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            credentials: Credentials::metadata(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Local emulator at `host` (e.g. `localhost:8080`), unauthenticated.
    #[must_use]
    pub fn emulator(project_id: impl Into<String>, host: &str) -> Self {
        let endpoint = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", host.trim_end_matches('/'))
        };
        Self {
            endpoint,
            credentials: Credentials::None,
            ..Self::new(project_id)
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Resource name prefix of every document, without the endpoint.
    #[must_use]
    pub fn documents_name(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }
}
