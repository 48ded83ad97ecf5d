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

//! [`PipelineConnector`]: a dual-role plugin implementing both
//! [`AsyncSource`] and [`AsyncSink`] over the same downstream buffer, used
//! to fan records from one pipeline into another.

use std::{
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
    time::Duration,
};

use async_trait::async_trait;
use buffer::Buffer;
use sink::AsyncSink;
use source::{AsyncSource, StopSignal};
use tokio::sync::RwLock;

/// How long a single write attempt into the downstream buffer blocks before
/// the connector checks whether it has been closed and retries. Writes
/// retry across attempts indefinitely (until success or shutdown), so this
/// only bounds responsiveness to `stop`/`shutdown`, not overall backpressure.
const WRITE_RETRY_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared<T> {
    name: String,
    sink_pipeline_name: String,
    source_pipeline_name: String,
    buffer: RwLock<Option<Arc<dyn Buffer<T>>>>,
    closed: AtomicBool,
}

/// A connector registered under two pipeline names: the *sink pipeline* (the
/// one writing into it) and the *source pipeline* (the one whose buffer it
/// feeds). One clone of this type is handed to each side; both clones share
/// the same state via an inner `Arc`, so binding the downstream buffer on
/// one side (as a `Source`) is visible to writes on the other side (as a
/// `Sink`).
pub struct PipelineConnector<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PipelineConnector<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> PipelineConnector<T> {
    /// Creates a new connector named `name`, linking `sink_pipeline_name`
    /// (the pipeline that writes into it) to `source_pipeline_name` (the
    /// pipeline whose buffer it feeds). Both names must be set before either
    /// pipeline starts.
    pub fn new(name: impl Into<String>, sink_pipeline_name: impl Into<String>, source_pipeline_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                sink_pipeline_name: sink_pipeline_name.into(),
                source_pipeline_name: source_pipeline_name.into(),
                buffer: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The connector's name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The name of the pipeline that writes into this connector.
    pub fn sink_pipeline_name(&self) -> &str {
        &self.shared.sink_pipeline_name
    }

    /// The name of the pipeline whose buffer this connector feeds.
    pub fn source_pipeline_name(&self) -> &str {
        &self.shared.source_pipeline_name
    }

    /// True once `shutdown` has been called on either face.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    async fn release(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        *self.shared.buffer.write().await = None;
    }
}

#[async_trait]
impl<T: Send + 'static> AsyncSource<T> for PipelineConnector<T> {
    /// Records the reference to the downstream pipeline's own buffer and
    /// waits for a stop request. The connector's source face is otherwise
    /// passive: it never itself writes into `buffer`, only hands out the
    /// reference for its sink face to use.
    async fn start(&mut self, buffer: Arc<dyn Buffer<T>>, mut stop_signal: StopSignal) -> Result<(), source::Error> {
        *self.shared.buffer.write().await = Some(buffer);
        stop_signal.stopped().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), source::Error> {
        self.release().await;
        Ok(())
    }
}

#[async_trait]
impl<T: Send + Clone + 'static> AsyncSink<T> for PipelineConnector<T> {
    /// Writes `batch` one record at a time into the downstream buffer,
    /// blocking indefinitely (retrying on a bounded per-attempt timeout) so
    /// that backpressure from the downstream buffer propagates upstream.
    async fn output(&mut self, batch: Vec<model::Record<T>>) -> Result<(), sink::Error> {
        for record in batch {
            loop {
                if self.shared.closed.load(Ordering::SeqCst) {
                    return Err(sink::Error::ConnectorClosed {
                        sink: self.shared.name.clone(),
                    });
                }

                let buffer = self.shared.buffer.read().await.clone();
                let Some(buffer) = buffer else {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                };

                match buffer.write(record.clone(), WRITE_RETRY_TIMEOUT).await {
                    Ok(()) => break,
                    Err(buffer::Error::Timeout { .. }) => continue,
                    Err(error) => {
                        return Err(sink::Error::Sink {
                            sink: self.shared.name.clone(),
                            error: error.to_string(),
                            context: std::collections::HashMap::new(),
                        })
                    }
                }
            }
        }

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), sink::Error> {
        self.release().await;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use buffer::BoundedBlockingBuffer;
    use model::Record;

    use super::*;

    #[tokio::test]
    async fn output_writes_reach_the_bound_downstream_buffer() {
        let mut connector = PipelineConnector::<u32>::new("conn", "upstream", "downstream");
        let downstream_buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("downstream", 8, 4));

        let (handle, signal) = source::stop_signal();
        let mut source_face = connector.clone();
        let buffer_for_source = Arc::clone(&downstream_buffer);
        let started = tokio::spawn(async move { AsyncSource::start(&mut source_face, buffer_for_source, signal).await });

        connector.output(vec![Record::new(1), Record::new(2)]).await.unwrap();

        let (batch, _state) = downstream_buffer.read(Duration::from_millis(50)).await;
        assert_eq!(batch.len(), 2);

        handle.request_stop();
        started.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn output_fails_after_shutdown() {
        let mut connector = PipelineConnector::<u32>::new("conn", "upstream", "downstream");
        let downstream_buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("downstream", 8, 4));

        let (handle, signal) = source::stop_signal();
        let mut source_face = connector.clone();
        let started = tokio::spawn(async move { AsyncSource::start(&mut source_face, downstream_buffer, signal).await });

        AsyncSink::shutdown(&mut connector).await.unwrap();

        let err = connector.output(vec![Record::new(1)]).await;
        assert!(matches!(err, Err(sink::Error::ConnectorClosed { .. })));

        handle.request_stop();
        started.await.unwrap().unwrap();
    }
}
