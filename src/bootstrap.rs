//! Process bootstrap: loads the pipeline configuration and the server
//! configuration, materialises the pipeline DAG through the default plugin
//! registry, starts the pipeline manager, spawns the control API, and waits
//! for a shutdown signal.

use std::{path::Path, sync::Arc};

use prometheus::Registry;
use registry::Registry as PluginRegistry;
use task::TaskManager;
use tracing::{error, info};

use crate::{
    plugins::{GeneratorSourceFactory, LogSinkFactory, UppercaseProcessorFactory},
    Error,
};

/// Builds the registry of in-process demo plugins the `prepper` binary knows
/// about. A production deployment of this runtime would register real
/// source/processor/sink plugins here instead.
pub fn default_registry() -> PluginRegistry<String> {
    let mut registry = PluginRegistry::new();
    registry
        .register_source(Arc::new(GeneratorSourceFactory))
        .expect("built-in demo source registration cannot collide");
    registry
        .register_processor(Arc::new(UppercaseProcessorFactory))
        .expect("built-in demo processor registration cannot collide");
    registry
        .register_sink(Arc::new(LogSinkFactory))
        .expect("built-in demo sink registration cannot collide");
    registry
}

/// Runs the process: loads both configuration files, starts every pipeline,
/// serves the control API, and blocks until SIGINT/ctrl-c triggers a
/// coordinated shutdown.
pub async fn run(pipeline_config_path: impl AsRef<Path>, server_config_path: Option<impl AsRef<Path>>) -> Result<(), Error> {
    let pipeline_config_path = pipeline_config_path.as_ref();
    let yaml = std::fs::read_to_string(pipeline_config_path).map_err(|error| Error::Io {
        file: pipeline_config_path.display().to_string(),
        message: error.to_string(),
    })?;

    let plugin_registry = default_registry();
    let raw_config = parser::parse(&yaml)?;
    let dag = parser::build(raw_config, &plugin_registry)?;

    let server_config = match server_config_path {
        Some(path) => server::ServerConfig::load(path)?,
        None => server::ServerConfig::default(),
    };

    let metrics_registry = Registry::new();
    let manager = Arc::new(manager::PipelineManager::new(
        dag.pipelines,
        dag.start_order,
        dag.shutdown_order,
        &metrics_registry,
    )?);

    let failures = manager.start().await;
    for failure in &failures {
        error!(%failure, "pipeline failed to start");
    }
    if failures.is_empty() {
        info!(pipelines = %manager.list_running_pipelines().len(), "all pipelines started");
    }

    let mut task_manager = TaskManager::new();
    let state = server::app_state(&server_config, Arc::clone(&manager), metrics_registry);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    server::spawn(&mut task_manager, server::bind_addr(&server_config), state, async move {
        let _ = shutdown_rx.await;
    });

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install ctrl-c handler; shutting down immediately");
    } else {
        info!("shutdown signal received");
    }

    manager.shutdown().await;
    let _ = shutdown_tx.send(());
    task_manager.join().await;

    // The process exit code is non-zero when a pipeline could not start,
    // even though the manager itself already let the rest run to completion.
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::PipelinesFailedToStart(failures))
    }
}
