//! Web server module for Tributary.
//!
//! Read-only HTTP surface over the collection engine:
//!
//! - `GET /health`: full [`EngineStatus`](crate::status::EngineStatus)
//! - `GET /metrics`: condensed [`StatusSummary`](crate::status::StatusSummary)
//! - `GET /healthz`: liveness probe
//!
//! The server starts before the engine is ready. Until a reporter is
//! installed, `/health` and `/metrics` answer 503.

use std::sync::{Arc, OnceLock};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::status::StatusReporter;

/// Shared application state.
#[derive(Clone, Default)]
pub struct AppState {
    reporter: Arc<OnceLock<StatusReporter>>,
}

impl AppState {
    /// State with no engine installed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// State with a ready engine.
    pub fn ready(reporter: StatusReporter) -> Self {
        let state = Self::new();
        state.install(reporter);
        state
    }

    /// Mark the engine ready. Later calls are ignored.
    pub fn install(&self, reporter: StatusReporter) {
        if self.reporter.set(reporter).is_err() {
            tracing::warn!("Status reporter already installed, ignoring");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.reporter.get().is_some()
    }

    fn reporter(&self) -> Option<&StatusReporter> {
        self.reporter.get()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Liveness response.
#[derive(Serialize)]
struct HealthzResponse {
    status: &'static str,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Full engine status.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.reporter() {
        Some(reporter) => Json(reporter.status()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
            .into_response(),
    }
}

/// Condensed counters.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.reporter() {
        Some(reporter) => Json(reporter.summary()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Collector not initialized" })),
        )
            .into_response(),
    }
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthzResponse> {
    Json(HealthzResponse { status: "ok" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::catalog::QueryCatalog;
    use crate::engine::CollectionEngine;
    use crate::registry::{Source, SourceRegistry};
    use crate::store::MemoryStore;

    fn reporter() -> StatusReporter {
        let registry = Arc::new(SourceRegistry::new(vec![
            Source::new("server_a", Arc::new(MemoryStore::new("a"))).with_buckets(["pods"]),
        ]));
        let engine = CollectionEngine::new(
            registry,
            Arc::new(QueryCatalog::builtin()),
            Arc::new(MemoryStore::new("central")),
        );
        StatusReporter::new(Arc::new(engine), Duration::from_secs(60))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_initializing() {
        let app = create_router(AppState::new());
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "initializing");
    }

    #[tokio::test]
    async fn test_metrics_initializing() {
        let app = create_router(AppState::new());
        let (status, body) = get_json(app, "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Collector not initialized");
    }

    #[tokio::test]
    async fn test_health_ready() {
        let app = create_router(AppState::ready(reporter()));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["collection_interval"], 60);
        assert_eq!(body["sources"]["server_a"]["enabled"], true);
        assert_eq!(body["sources"]["server_a"]["buckets"][0], "pods");
    }

    #[tokio::test]
    async fn test_install_after_start() {
        let state = AppState::new();
        let app = create_router(state.clone());
        assert!(!state.is_ready());

        state.install(reporter());
        assert!(state.is_ready());

        let (status, body) = get_json(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources_count"], 1);
        assert_eq!(body["enabled_sources"], 1);
        assert_eq!(body["metrics_collected_total"], 0);
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, body) = get_json(create_router(AppState::new()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
