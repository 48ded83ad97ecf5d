//! Per-pipeline tunables: worker count, read timeout, empty-read
//! delay, and the bounded wait the shutdown sequence allows for draining.

use std::time::Duration;

/// Configuration governing a single pipeline's worker pool and shutdown.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of concurrent worker tasks pulling batches off the buffer.
    pub workers: usize,
    /// Sleep applied after an empty read before trying again.
    pub delay: Duration,
    /// How long a worker's `buffer.read` call may block per attempt.
    pub read_timeout: Duration,
    /// How long `stop()` waits for the buffer to drain and for worker/source
    /// tasks to exit before giving up and reporting STOPPED anyway.
    pub drain_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            delay: Duration::from_millis(3000),
            read_timeout: Duration::from_millis(1000),
            drain_deadline: Duration::from_secs(10),
        }
    }
}
