#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! The control API (/): a small axum server exposing the running
//! pipeline set and a Prometheus scrape endpoint, independent of the
//! pipeline configuration that the `parser` crate builds.

use std::{future::Future, net::SocketAddr, sync::Arc};

use prometheus::Registry;
use task::{labels::TaskLabels, TaskManager};

mod config;
mod routes;

pub use config::{MetricsRegistryKind, ServerConfig};
pub use routes::AppState;

/// All the errors the control server can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The server configuration file could not be read or parsed.
    #[error("invalid server config '{file}': {message}")]
    InvalidConfig {
        /// Path to the offending file.
        file: String,
        /// The underlying error message.
        message: String,
    },

    /// The control API could not bind its listening address.
    #[error("failed to bind control API to {addr}: {reason}")]
    Bind {
        /// The address that failed to bind.
        addr: SocketAddr,
        /// The underlying error message.
        reason: String,
    },

    /// The control API's accept loop exited with an error.
    #[error("control API server error: {0}")]
    Serve(String),
}

/// Runs the control API until `shutdown` resolves or the accept loop errors.
/// Intended to be spawned as its own task; see [`spawn`] for the version
/// registered with a [`TaskManager`].
pub async fn serve<T: Send + Clone + 'static>(
    addr: SocketAddr,
    state: Arc<AppState<T>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Error> {
    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|error| Error::Bind { addr, reason: error.to_string() })?;

    tracing::info!(%addr, "control API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|error| Error::Serve(error.to_string()))
}

/// Spawns the control API as a task registered with `task_manager`, so that a
/// process-wide `TaskManager::join` waits on it alongside pipeline workers.
/// `shutdown` resolves once the process decides to stop accepting
/// connections; without it the task would never finish and `TaskManager::join`
/// would hang forever.
pub fn spawn<T: Send + Clone + 'static>(
    task_manager: &mut TaskManager,
    addr: SocketAddr,
    state: Arc<AppState<T>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    let task_labels = TaskLabels::new("server", "control-api", "NA");
    let process_labels = task_manager.process_labels();
    let cleanup_labels = task_labels.clone();

    let join_handle = tokio::spawn(async move {
        if let Err(error) = serve(addr, state, shutdown).await {
            tracing::error!(%error, "control API server exited with an error");
        }
        TaskManager::no_task_cleaner(process_labels, cleanup_labels)
    });

    task_manager.register(join_handle, &task_labels);
}

/// Builds the listening address from a [`ServerConfig`], bound to all
/// interfaces.
pub fn bind_addr(config: &ServerConfig) -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], config.server_port))
}

/// Builds the registry-backed [`AppState`] for a server configuration and an
/// already-started pipeline manager.
pub fn app_state<T: Send + Clone + 'static>(
    config: &ServerConfig,
    manager: Arc<manager::PipelineManager<T>>,
    metrics_registry: Registry,
) -> Arc<AppState<T>> {
    Arc::new(AppState::new(manager, metrics_registry, config.metrics_enabled()))
}
