//! KnowDose HTTP backend: medication schedules, dose records, user settings
//! and a generative-model proxy for label analysis.

pub mod ai;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod rate_limit;
pub mod repository;
pub mod server;

pub use ai::{AiError, AiService, GeminiClient, GenerativeModel};
pub use config::{AppConfig, StorageBackend, StorageLayout};
pub use error::ApiError;
pub use observability::init_tracing;
pub use repository::Repository;
pub use server::{AppState, KnowdoseServer, ServerBuilder, build_app, build_router};
