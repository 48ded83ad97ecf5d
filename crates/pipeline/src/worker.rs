//! A single worker's pull → process → fan-out-to-sinks → checkpoint loop
//! (Startup).

use std::sync::{atomic::AtomicU64, atomic::Ordering, Arc};

use buffer::Buffer;
use processor::AsyncProcessor;
use sink::AsyncSink;
use source::StopSignal;

use crate::config::PipelineConfig;

/// The processors and sinks owned by a single worker. Workers do not share
/// plugin instances: the parser builds one chain and one set of sinks per
/// worker so each can run concurrently without locking.
pub struct WorkerUnit<T: Send + 'static> {
    /// The ordered processor chain this worker applies to every batch.
    pub processors: Vec<Box<dyn AsyncProcessor<T>>>,
    /// The sinks this worker fans every (post-processor) batch out to.
    pub sinks: Vec<Box<dyn AsyncSink<T>>>,
}

pub(crate) async fn run<T: Send + Clone + 'static>(
    pipeline_name: String,
    buffer: Arc<dyn Buffer<T>>,
    mut unit: WorkerUnit<T>,
    config: PipelineConfig,
    stop_signal: StopSignal,
    checkpointed: Arc<AtomicU64>,
) {
    loop {
        let (batch, checkpoint) = buffer.read(config.read_timeout).await;

        if batch.is_empty() {
            if stop_signal.is_stopped() && buffer.is_empty().await {
                break;
            }
            if !config.delay.is_zero() {
                tokio::time::sleep(config.delay).await;
            }
            continue;
        }

        let mut current = batch;
        let mut dropped = false;

        for processor in unit.processors.iter_mut() {
            match processor.execute(current).await {
                Ok(next) => current = next,
                Err(error) => {
                    tracing::error!(pipeline = %pipeline_name, %error, "processor failed, dropping batch");
                    dropped = true;
                    break;
                }
            }
        }

        if !dropped {
            for sink in unit.sinks.iter_mut() {
                if let Err(error) = sink.output(current.clone()).await {
                    tracing::error!(pipeline = %pipeline_name, %error, "sink failed, continuing to remaining sinks");
                }
            }
        }

        // Unconditional: checkpoint releases capacity whether the batch was
        // delivered, dropped on a processor error, or partially delivered
        // after a sink error. This is what keeps the buffer from deadlocking
        // on a misbehaving plugin.
        let record_count = checkpoint.record_count() as u64;
        buffer.checkpoint(checkpoint).await;
        let _ = checkpointed.fetch_add(record_count, Ordering::Relaxed);

        if stop_signal.is_stopped() && buffer.is_empty().await {
            break;
        }
    }

    for processor in unit.processors.iter_mut() {
        if let Err(error) = processor.shutdown().await {
            tracing::warn!(pipeline = %pipeline_name, %error, "processor shutdown hook failed");
        }
    }
    for sink in unit.sinks.iter_mut() {
        if let Err(error) = sink.shutdown().await {
            tracing::warn!(pipeline = %pipeline_name, %error, "sink shutdown hook failed");
        }
    }
}
