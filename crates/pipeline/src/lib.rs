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

//! [`Pipeline`]: owns one source, one buffer, a pool of worker tasks (each
//! running its own processor chain and sink set), and coordinates the
//! CREATED → STARTED → STOPPING → STOPPED lifecycle.

use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc,
};

use buffer::Buffer;
use source::{AsyncSource, StopHandle, StopSignal};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{timeout, Instant},
};

pub mod config;
pub mod state;
mod worker;

pub use config::PipelineConfig;
pub use state::PipelineState;
pub use worker::WorkerUnit;

/// All the errors a pipeline can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// `start()` was called on a pipeline that is not in the CREATED state.
    #[error("pipeline '{pipeline}' cannot be started from state {from:?}")]
    AlreadyStarted {
        /// The pipeline's name.
        pipeline: String,
        /// The state it was actually in.
        from: PipelineState,
    },
}

struct Inner<T: Send + 'static> {
    name: String,
    config: PipelineConfig,
    buffer: Arc<dyn Buffer<T>>,
    source: Mutex<Option<Box<dyn AsyncSource<T>>>>,
    workers: Mutex<Vec<WorkerUnit<T>>>,
    state: AtomicU8,
    stop_handle: StopHandle,
    stop_signal: StopSignal,
    source_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    checkpointed: Arc<AtomicU64>,
    source_failure: std::sync::Mutex<Option<String>>,
}

/// A single source → buffer → processor-chain(s) → sinks pipeline.
///
/// Cheaply cloneable: every clone shares the same underlying state, so the
/// pipeline manager and any spawned tasks can each hold a handle.
pub struct Pipeline<T: Send + 'static>(Arc<Inner<T>>);

impl<T: Send + 'static> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Send + Clone + 'static> Pipeline<T> {
    /// Builds a new, unstarted pipeline. `workers` is consumed by `start()`,
    /// one [`WorkerUnit`] per worker task.
    pub fn new(
        name: impl Into<String>,
        config: PipelineConfig,
        buffer: Arc<dyn Buffer<T>>,
        source: Box<dyn AsyncSource<T>>,
        workers: Vec<WorkerUnit<T>>,
    ) -> Self {
        let (stop_handle, stop_signal) = source::stop_signal();
        Self(Arc::new(Inner {
            name: name.into(),
            config,
            buffer,
            source: Mutex::new(Some(source)),
            workers: Mutex::new(workers),
            state: AtomicU8::new(PipelineState::Created as u8),
            stop_handle,
            stop_signal,
            source_handle: Mutex::new(None),
            worker_handles: Mutex::new(Vec::new()),
            checkpointed: Arc::new(AtomicU64::new(0)),
            source_failure: std::sync::Mutex::new(None),
        }))
    }

    /// The pipeline's name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The pipeline's current lifecycle state.
    pub fn state(&self) -> PipelineState {
        PipelineState::from(self.0.state.load(Ordering::SeqCst))
    }

    /// True when the pipeline is in the STARTED state.
    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Started
    }

    /// A clone of the buffer reference, for connectors that need to read it
    /// as the source side of a DAG edge.
    pub fn buffer(&self) -> Arc<dyn Buffer<T>> {
        Arc::clone(&self.0.buffer)
    }

    /// Total records checkpointed across every worker since this pipeline
    /// started. Monotonic; used by the manager's metrics collector.
    pub fn records_checkpointed(&self) -> u64 {
        self.0.checkpointed.load(Ordering::Relaxed)
    }

    /// The reason this pipeline's source exited with a fatal error, if it
    /// ever did. `None` for a pipeline that has never crashed, including one
    /// stopped normally via [`Pipeline::stop`].
    pub fn source_failure(&self) -> Option<String> {
        self.0.source_failure.lock().expect("source_failure lock poisoned").clone()
    }

    fn set_state(&self, state: PipelineState) {
        self.0.state.store(state as u8, Ordering::SeqCst);
    }

    /// Starts the source and worker pool. Fails if the pipeline is not in
    /// the CREATED state.
    pub async fn start(&self) -> Result<(), Error> {
        self.0
            .state
            .compare_exchange(
                PipelineState::Created as u8,
                PipelineState::Started as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|observed| Error::AlreadyStarted {
                pipeline: self.0.name.clone(),
                from: PipelineState::from(observed),
            })?;

        let mut source = self
            .0
            .source
            .lock()
            .await
            .take()
            .expect("source taken exactly once, guarded by the CREATED -> STARTED transition");

        let buffer = Arc::clone(&self.0.buffer);
        let stop_signal = self.0.stop_signal.clone();
        let pipeline_name = self.0.name.clone();
        let inner = Arc::clone(&self.0);

        let source_handle = tokio::spawn(async move {
            if let Err(error) = source.start(buffer, stop_signal).await {
                tracing::error!(pipeline = %pipeline_name, %error, "source exited with a fatal error");
                *inner.source_failure.lock().expect("source_failure lock poisoned") = Some(error.to_string());
                // A crashed source never recovers on its own; tell the
                // workers to drain and exit, then surface the failure
                // immediately rather than leaving the pipeline reporting
                // STARTED until someone calls stop().
                inner.stop_handle.request_stop();
                inner.state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
            }
            if let Err(error) = source.stop().await {
                tracing::warn!(pipeline = %pipeline_name, %error, "source stop hook failed");
            }
            if let Err(error) = source.shutdown().await {
                tracing::warn!(pipeline = %pipeline_name, %error, "source shutdown hook failed");
            }
        });
        *self.0.source_handle.lock().await = Some(source_handle);

        let units: Vec<_> = self.0.workers.lock().await.drain(..).collect();
        let mut handles = Vec::with_capacity(units.len());
        for unit in units {
            let buffer = Arc::clone(&self.0.buffer);
            let config = self.0.config.clone();
            let stop_signal = self.0.stop_signal.clone();
            let pipeline_name = self.0.name.clone();
            let checkpointed = Arc::clone(&self.0.checkpointed);
            handles.push(tokio::spawn(worker::run(pipeline_name, buffer, unit, config, stop_signal, checkpointed)));
        }
        let worker_count = handles.len();
        *self.0.worker_handles.lock().await = handles;

        tracing::info!(pipeline = %self.0.name, workers = worker_count, "pipeline started");
        Ok(())
    }

    /// Stops the pipeline. Idempotent: calling `stop()` on a pipeline that
    /// is already STOPPING or STOPPED simply waits for/confirms completion.
    ///
    /// Sequence: request source stop; mark STOPPING; wait (bounded by
    /// `drain_deadline`) for the buffer to empty and for the source/worker
    /// tasks to exit; report STOPPED regardless of whether the deadline was
    /// reached (a still-blocked sink is logged, not awaited forever).
    pub async fn stop(&self) {
        match self.state() {
            PipelineState::Stopped => return,
            PipelineState::Created => {
                self.set_state(PipelineState::Stopped);
                return;
            }
            PipelineState::Started => {
                let _ = self.0.state.compare_exchange(
                    PipelineState::Started as u8,
                    PipelineState::Stopping as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            PipelineState::Stopping => {}
        }

        self.0.stop_handle.request_stop();

        let deadline = Instant::now() + self.0.config.drain_deadline;
        while Instant::now() < deadline && !self.0.buffer.is_empty().await {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        if !self.0.buffer.is_empty().await {
            tracing::warn!(pipeline = %self.0.name, "drain deadline elapsed with records still in flight");
        }

        if let Some(handle) = self.0.source_handle.lock().await.take() {
            if timeout(self.0.config.drain_deadline, handle).await.is_err() {
                tracing::warn!(pipeline = %self.0.name, "source task did not exit within the drain deadline");
            }
        }

        let handles = std::mem::take(&mut *self.0.worker_handles.lock().await);
        for handle in handles {
            if timeout(self.0.config.drain_deadline, handle).await.is_err() {
                tracing::warn!(pipeline = %self.0.name, "worker task did not exit within the drain deadline");
            }
        }

        self.set_state(PipelineState::Stopped);
        tracing::info!(pipeline = %self.0.name, "pipeline stopped");
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Mutex as StdMutex, time::Duration};

    use async_trait::async_trait;
    use buffer::BoundedBlockingBuffer;
    use model::Record;

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
            let mut items = self.items.lock().expect("list sink lock poisoned");
            items.extend(batch.into_iter().map(Record::into_payload));
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_pipeline_delivers_every_record_to_the_sink() {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("buf", 512, 8));
        let source = Box::new(CountingSource { count: 1000 });
        let workers = vec![WorkerUnit {
            processors: vec![],
            sinks: vec![Box::new(ListSink { items: Arc::clone(&collected) })],
        }];

        let pipeline = Pipeline::new(
            "p",
            PipelineConfig {
                workers: 1,
                delay: Duration::from_millis(5),
                read_timeout: Duration::from_millis(50),
                drain_deadline: Duration::from_secs(5),
            },
            buffer,
            source,
            workers,
        );

        pipeline.start().await.unwrap();
        // Give the source a beat to finish writing before asking to stop.
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await;

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(collected.lock().unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn capacity_four_batch_two_all_ten_records_arrive() {
        let collected = Arc::new(StdMutex::new(Vec::new()));
        let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("buf", 4, 2));
        let source = Box::new(CountingSource { count: 10 });
        let workers = vec![WorkerUnit {
            processors: vec![],
            sinks: vec![Box::new(ListSink { items: Arc::clone(&collected) })],
        }];

        let pipeline = Pipeline::new(
            "p",
            PipelineConfig {
                workers: 1,
                delay: Duration::from_millis(5),
                read_timeout: Duration::from_millis(50),
                drain_deadline: Duration::from_secs(5),
            },
            buffer,
            source,
            workers,
        );

        pipeline.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await;

        assert_eq!(collected.lock().unwrap().len(), 10);
    }

    struct FailingSource;

    #[async_trait]
    impl AsyncSource<u32> for FailingSource {
        async fn start(&mut self, _buffer: Arc<dyn Buffer<u32>>, _stop_signal: StopSignal) -> Result<(), source::Error> {
            Err(source::Error::Source {
                source: "failing".to_string(),
                error: "boom".to_string(),
                context: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn crashing_source_transitions_pipeline_to_stopped() {
        let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("buf", 4, 2));
        let pipeline = Pipeline::new("p", PipelineConfig::default(), buffer, Box::new(FailingSource), vec![]);

        pipeline.start().await.unwrap();
        // Give the spawned source task a beat to run and fail.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert!(!pipeline.is_running());
        assert!(pipeline.source_failure().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("buf", 4, 2));
        let source = Box::new(CountingSource { count: 0 });
        let pipeline = Pipeline::new("p", PipelineConfig::default(), buffer, source, vec![]);

        pipeline.start().await.unwrap();
        assert!(matches!(pipeline.start().await, Err(Error::AlreadyStarted { .. })));
        pipeline.stop().await;
    }
}
