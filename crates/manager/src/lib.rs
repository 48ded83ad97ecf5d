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

//! [`PipelineManager`]: the process-wide supervisor that owns every
//! pipeline built by the parser, starts them, and coordinates shutdown in
//! reverse-topological order.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
};

use pipeline::Pipeline;
use prometheus::Registry;
use tracing::{error, info};

mod metrics;

use metrics::PipelineMetrics;

/// All the errors the pipeline manager can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A pipeline failed to start. Non-fatal to the manager: other pipelines
    /// still start ("source crash is local to its pipeline").
    #[error("pipeline '{pipeline}' failed to start (reason: {reason})")]
    StartFailed {
        /// The pipeline that failed.
        pipeline: String,
        /// The underlying error.
        reason: String,
    },

    /// The metrics collector could not be registered (e.g. a name clash in
    /// the supplied registry).
    #[error("metrics registration failed (reason: {0})")]
    Metrics(String),
}

/// Owns the full set of pipelines materialised by the parser for a single
/// record type `T`, plus the start/shutdown orders computed from the
/// connector DAG.
pub struct PipelineManager<T: Send + Clone + 'static> {
    pipelines: HashMap<String, Pipeline<T>>,
    start_order: Vec<String>,
    shutdown_order: Vec<String>,
    metrics: PipelineMetrics,
    shutting_down: AtomicBool,
}

impl<T: Send + Clone + 'static> PipelineManager<T> {
    /// Builds a manager over an already-materialised pipeline set. `metrics_registry`
    /// receives the per-pipeline running/checkpointed gauges.
    pub fn new(
        pipelines: HashMap<String, Pipeline<T>>,
        start_order: Vec<String>,
        shutdown_order: Vec<String>,
        metrics_registry: &Registry,
    ) -> Result<Self, Error> {
        let metrics = PipelineMetrics::register(metrics_registry).map_err(|error| Error::Metrics(error.to_string()))?;
        Ok(Self {
            pipelines,
            start_order,
            shutdown_order,
            metrics,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Starts every pipeline in `start_order` (leaves first, so downstream
    /// connector targets are ready before upstream pipelines can write into
    /// them). A pipeline that fails to start is logged and skipped; the
    /// remaining pipelines still start.
    pub async fn start(&self) -> Vec<Error> {
        let mut failures = Vec::new();
        for name in &self.start_order {
            let pipeline = self.pipelines.get(name).expect("start_order only names pipelines this manager owns");
            if let Err(error) = pipeline.start().await {
                error!(pipeline = %name, %error, "pipeline failed to start");
                failures.push(Error::StartFailed {
                    pipeline: name.clone(),
                    reason: error.to_string(),
                });
            }
        }
        self.refresh_metrics();
        failures
    }

    /// Stops every pipeline in `shutdown_order` (roots first, so records
    /// already in flight drain toward sinks rather than stranding in a
    /// buffer), waiting for each one's own bounded drain deadline before
    /// moving to the next. Idempotent: a second call returns immediately.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(pipelines = self.shutdown_order.len(), "shutting down pipeline manager");
        for name in &self.shutdown_order {
            let pipeline = self.pipelines.get(name).expect("shutdown_order only names pipelines this manager owns");
            pipeline.stop().await;
        }
        self.refresh_metrics();
    }

    /// Names of every pipeline currently in the STARTED state.
    pub fn list_running_pipelines(&self) -> Vec<String> {
        self.pipelines
            .values()
            .filter(|pipeline| pipeline.is_running())
            .map(|pipeline| pipeline.name().to_string())
            .collect()
    }

    /// True when at least one pipeline is running.
    pub fn is_running(&self) -> bool {
        self.pipelines.values().any(Pipeline::is_running)
    }

    /// Pipelines whose source exited with a fatal error, paired with the
    /// failure reason. A pipeline stopped via [`PipelineManager::shutdown`]
    /// never appears here; only a crash does.
    pub fn crashed_pipelines(&self) -> Vec<(String, String)> {
        self.pipelines
            .values()
            .filter_map(|pipeline| pipeline.source_failure().map(|reason| (pipeline.name().to_string(), reason)))
            .collect()
    }

    /// Re-reads every pipeline's state into the metrics registry. Called
    /// automatically after `start`/`shutdown`; the control API also calls
    /// this immediately before serving a scrape so gauges are never more
    /// than one request stale.
    pub fn refresh_metrics(&self) {
        for (name, pipeline) in &self.pipelines {
            self.metrics.observe(name, pipeline.is_running(), pipeline.records_checkpointed());
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex as StdMutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use buffer::{Buffer, BoundedBlockingBuffer};
    use model::Record;
    use pipeline::{PipelineConfig, WorkerUnit};
    use source::{AsyncSource, StopSignal};

    use super::*;

    struct CountingSource {
        count: u32,
    }

    #[async_trait]
    impl AsyncSource<u32> for CountingSource {
        async fn start(&mut self, buffer: Arc<dyn Buffer<u32>>, _stop_signal: StopSignal) -> Result<(), source::Error> {
            for i in 0..self.count {
                let _ = buffer.write(Record::new(i), Duration::from_millis(200)).await;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct ListSink {
        items: Arc<StdMutex<Vec<u32>>>,
    }

    #[async_trait]
    impl sink::AsyncSink<u32> for ListSink {
        async fn output(&mut self, batch: Vec<Record<u32>>) -> Result<(), sink::Error> {
            self.items.lock().expect("list sink lock poisoned").extend(batch.into_iter().map(Record::into_payload));
            Ok(())
        }
    }

    fn single_pipeline(name: &str, count: u32, collected: Arc<StdMutex<Vec<u32>>>) -> Pipeline<u32> {
        let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new(name, 512, 8));
        Pipeline::new(
            name,
            PipelineConfig {
                workers: 1,
                delay: Duration::from_millis(5),
                read_timeout: Duration::from_millis(50),
                drain_deadline: Duration::from_secs(5),
            },
            buffer,
            Box::new(CountingSource { count }),
            vec![WorkerUnit {
                processors: vec![],
                sinks: vec![Box::new(ListSink { items: collected })],
            }],
        )
    }

    #[tokio::test]
    async fn start_runs_every_pipeline_and_shutdown_stops_them_all() {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let mut pipelines = HashMap::new();
        let _ = pipelines.insert("p".to_string(), single_pipeline("p", 50, Arc::clone(&collected)));

        let registry = Registry::new();
        let manager = PipelineManager::new(pipelines, vec!["p".to_string()], vec!["p".to_string()], &registry).unwrap();

        let failures = manager.start().await;
        assert!(failures.is_empty());
        assert_eq!(manager.list_running_pipelines(), vec!["p".to_string()]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        manager.shutdown().await;

        assert!(manager.list_running_pipelines().is_empty());
        assert_eq!(collected.lock().unwrap().len(), 50);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let mut pipelines = HashMap::new();
        let _ = pipelines.insert("p".to_string(), single_pipeline("p", 0, collected));

        let registry = Registry::new();
        let manager = PipelineManager::new(pipelines, vec!["p".to_string()], vec!["p".to_string()], &registry).unwrap();

        let _ = manager.start().await;
        manager.shutdown().await;
        manager.shutdown().await;
    }
}
