// HTTP + WebSocket routes

mod http;
mod ws;

pub use ws::ClientCommand;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tower_http::cors::{Any, CorsLayer};

use crate::command::CommandRunner;
use crate::config::AppConfig;
use crate::fetcher::Fetcher;

pub(crate) struct AppState<R> {
    pub(crate) fetcher: Arc<Fetcher<R>>,
    pub(crate) ws_connections: Arc<AtomicUsize>,
    pub(crate) config: Arc<AppConfig>,
}

// Manual impl: R itself need not be Clone.
impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            ws_connections: self.ws_connections.clone(),
            config: self.config.clone(),
        }
    }
}

pub fn app<R: CommandRunner>(
    fetcher: Arc<Fetcher<R>>,
    ws_connections: Arc<AtomicUsize>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        fetcher,
        ws_connections,
        config: Arc::new(config),
    };
    Router::new()
        .route("/", get(|| async { "Kestral: workspace telemetry feed" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/categories", get(http::categories_handler::<R>)) // GET /api/categories
        .route("/ws/dashboard", get(ws::ws_dashboard::<R>)) // WS /ws/dashboard
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
