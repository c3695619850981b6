#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use knowdose_server::{AppConfig, AppState, build_router};
use knowdose_storage::DynStore;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const USER_A: &str = "user-a";
pub const USER_B: &str = "user-b";

pub struct TestServer {
    pub base: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.handle.await;
    }
}

/// Serves `app` on an ephemeral localhost port.
pub async fn spawn(app: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = rx.await;
        })
        .await;
    });

    TestServer {
        base: format!("http://{addr}"),
        shutdown: Some(tx),
        handle,
    }
}

/// Serves the application for `cfg` on top of `store`.
pub async fn spawn_with_store(cfg: &AppConfig, store: DynStore) -> TestServer {
    let state = AppState::with_store(cfg, store).expect("app state");
    spawn(build_router(state, cfg)).await
}

/// Serves the application for `cfg` with a fresh in-memory store.
pub async fn spawn_config(cfg: &AppConfig) -> TestServer {
    spawn_with_store(cfg, knowdose_db_memory::create_store()).await
}
