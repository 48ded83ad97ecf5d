//! The control API's HTTP surface: `GET /list`, `POST /shutdown`,
//! `GET /metrics/prometheus`, `GET /metrics/sys`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use manager::PipelineManager;
use prometheus::{Encoder, Registry, TextEncoder};

/// Shared state handed to every route handler.
pub struct AppState<T: Send + Clone + 'static> {
    manager: Arc<PipelineManager<T>>,
    metrics_registry: Registry,
    metrics_enabled: bool,
    started_at: std::time::Instant,
}

impl<T: Send + Clone + 'static> AppState<T> {
    /// Builds the shared state. `metrics_enabled` gates both `/metrics/*`
    /// routes, matching the server configuration's `metrics_registries`.
    pub fn new(manager: Arc<PipelineManager<T>>, metrics_registry: Registry, metrics_enabled: bool) -> Self {
        Self {
            manager,
            metrics_registry,
            metrics_enabled,
            started_at: std::time::Instant::now(),
        }
    }
}

/// Builds the control API router over `state`.
pub fn router<T: Send + Clone + 'static>(state: Arc<AppState<T>>) -> Router {
    Router::new()
        .route("/list", get(list::<T>))
        .route("/shutdown", post(shutdown::<T>))
        .route("/metrics/prometheus", get(metrics_prometheus::<T>))
        .route("/metrics/sys", get(metrics_sys::<T>))
        .with_state(state)
}

async fn list<T: Send + Clone + 'static>(State(state): State<Arc<AppState<T>>>) -> Json<Vec<String>> {
    Json(state.manager.list_running_pipelines())
}

async fn shutdown<T: Send + Clone + 'static>(State(state): State<Arc<AppState<T>>>) -> StatusCode {
    let manager = Arc::clone(&state.manager);
    let _join_handle = tokio::spawn(async move { manager.shutdown().await });
    StatusCode::OK
}

async fn metrics_prometheus<T: Send + Clone + 'static>(State(state): State<Arc<AppState<T>>>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, String::new());
    }

    state.manager.refresh_metrics();

    let families = state.metrics_registry.gather();
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    if encoder.encode(&families, &mut body).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    (StatusCode::OK, String::from_utf8_lossy(&body).into_owned())
}

async fn metrics_sys<T: Send + Clone + 'static>(State(state): State<Arc<AppState<T>>>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, String::new());
    }

    let uptime_seconds = state.started_at.elapsed().as_secs_f64();
    let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);

    let body = format!(
        "# HELP prepper_process_uptime_seconds Process uptime in seconds.\n\
         # TYPE prepper_process_uptime_seconds gauge\n\
         prepper_process_uptime_seconds {uptime_seconds}\n\
         # HELP prepper_process_threads Available parallelism.\n\
         # TYPE prepper_process_threads gauge\n\
         prepper_process_threads {threads}\n"
    );

    (StatusCode::OK, body)
}
