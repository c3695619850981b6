use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
};
use knowdose_db_firestore::{Credentials, FirestoreConfig};
use knowdose_storage::DynStore;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::ai::{AiService, GeminiClient, GenerativeModel};
use crate::config::{AppConfig, FirestoreSettings, StorageBackend};
use crate::middleware::{RequestId, request_id};
use crate::rate_limit::{self, RateLimiter};
use crate::repository::Repository;
use crate::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub ai: AiService,
}

impl AppState {
    pub fn new(repo: Repository, ai: AiService) -> Self {
        Self { repo, ai }
    }

    /// State for `cfg` on top of an already constructed store.
    pub fn with_store(cfg: &AppConfig, store: DynStore) -> anyhow::Result<Self> {
        let repo = Repository::new(
            store,
            cfg.storage.layout,
            cfg.storage.app_id.clone(),
            cfg.records.persist,
        );
        Ok(Self::new(repo, build_ai(cfg)?))
    }
}

fn firestore_config(project_id: &str, fs: &FirestoreSettings) -> FirestoreConfig {
    let config = match &fs.emulator_host {
        Some(host) if !host.is_empty() => FirestoreConfig::emulator(project_id, host),
        _ => {
            let credentials = match (&fs.client_email, &fs.private_key) {
                (Some(email), Some(key)) => Credentials::service_account(email, key),
                _ => Credentials::metadata(),
            };
            FirestoreConfig::new(project_id).with_credentials(credentials)
        }
    };
    let config = match &fs.endpoint {
        Some(endpoint) => config.with_endpoint(endpoint.clone()),
        None => config,
    };
    config
        .with_database(fs.database_id.clone())
        .with_request_timeout(fs.timeout())
}

/// Creates the document store selected by `storage.backend`.
pub fn build_store(cfg: &AppConfig) -> anyhow::Result<DynStore> {
    match cfg.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(knowdose_db_memory::create_store())
        }
        StorageBackend::Firestore => {
            let fs = &cfg.storage.firestore;
            let project_id = fs
                .project_id
                .as_deref()
                .context("storage.firestore.project_id is required")?;
            let config = firestore_config(project_id, fs);
            tracing::info!(
                project_id,
                endpoint = %config.endpoint,
                credentials = ?config.credentials,
                "Connecting to Firestore"
            );
            knowdose_db_firestore::create_store(config).context("Firestore initialization failed")
        }
    }
}

/// Creates the AI service; without an API key every AI call is unavailable.
pub fn build_ai(cfg: &AppConfig) -> anyhow::Result<AiService> {
    let model: Option<Arc<dyn GenerativeModel>> = match cfg.ai.api_key() {
        Some(key) => {
            let client = GeminiClient::new(key, cfg.ai.base_url.clone(), cfg.ai.timeout())
                .context("Gemini client initialization failed")?;
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY missing; AI routes will answer 503");
            None
        }
    };
    Ok(AiService::new(
        model,
        cfg.ai.text_model.clone(),
        cfg.ai.image_model.clone(),
        cfg.ai.prompt_version,
    ))
}

pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = AppState::with_store(cfg, build_store(cfg)?)?;
    Ok(build_router(state, cfg))
}

pub fn build_router(state: AppState, cfg: &AppConfig) -> Router {
    let mut ai_routes = Router::new()
        .route("/text", post(handlers::ai_text))
        .route("/analyze-image", post(handlers::ai_analyze_image));
    if cfg.rate_limit.enabled {
        let limiter = Arc::new(RateLimiter::new(
            cfg.rate_limit.max_requests,
            cfg.rate_limit.window(),
        ));
        ai_routes = ai_routes.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit::limit,
        ));
    }

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Medications and dose records
        .route(
            "/api/medications",
            get(handlers::list_medications).post(handlers::create_medication),
        )
        .route("/api/medications/records", get(handlers::list_all_records))
        .route(
            "/api/medications/{id}",
            put(handlers::update_medication).delete(handlers::delete_medication),
        )
        .route(
            "/api/medications/{id}/records",
            get(handlers::list_medication_records).post(handlers::create_record),
        )
        // Settings
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::save_settings),
        )
        // Generative model proxy
        .nest("/api/ai", ai_routes)
        .fallback(handlers::not_found)
        .with_state(state)
        // Middleware stack (inner to outer: body limit -> trace -> request id -> compression -> cors)
        .layer(DefaultBodyLimit::max(cfg.server.body_limit_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<RequestId>()
                        .and_then(|id| id.0.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id,
                        user_id = Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(request_id))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

pub struct KnowdoseServer {
    addr: SocketAddr,
    app: Router,
}

impl KnowdoseServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynStore>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            store: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `store` instead of the one selected by the configuration.
    pub fn with_store(mut self, store: DynStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> anyhow::Result<KnowdoseServer> {
        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config)?,
        };
        let state = AppState::with_store(&self.config, store)?;
        tracing::info!(
            backend = state.repo.backend_name(),
            layout = ?self.config.storage.layout,
            ai_available = state.ai.is_available(),
            "Application state initialized"
        );

        Ok(KnowdoseServer {
            addr: self.addr,
            app: build_router(state, &self.config),
        })
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
