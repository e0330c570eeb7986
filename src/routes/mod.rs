pub mod health;
pub mod ingest;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::engine::DetectionEngine;
use crate::live_bus::LiveBus;
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub engine: Arc<DetectionEngine>,
    pub live_bus: LiveBus,
}

pub fn build_router(state: AppState, settings: &Settings) -> Router {
    let cors = if settings.cors_origins().iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any)
    } else {
        let origins: Vec<_> = settings
            .cors_origins()
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/ingest/test", get(ingest::ingest_test))
        .route("/ws/live", get(ws::live_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
