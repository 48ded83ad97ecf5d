//! End-to-end scenario 4: a processor throws on every 7th record. The
//! sink still receives the other records, the pipeline never deadlocks, and
//! the buffer drains cleanly on stop.

mod common;

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use buffer::{BoundedBlockingBuffer, Buffer};
use common::{CountingSource, FailEveryNthProcessor, ListSink};
use pipeline::{Pipeline, PipelineConfig, WorkerUnit};

#[tokio::test]
async fn batches_touching_the_seventh_record_are_dropped_but_the_rest_arrive() {
    let collected = Arc::new(StdMutex::new(Vec::new()));
    let buffer: Arc<dyn Buffer<u32>> = Arc::new(BoundedBlockingBuffer::new("p", 512, 1));

    let pipeline = Pipeline::new(
        "p",
        PipelineConfig {
            workers: 1,
            delay: Duration::from_millis(5),
            read_timeout: Duration::from_millis(50),
            drain_deadline: Duration::from_secs(5),
        },
        buffer,
        Box::new(CountingSource { count: 70 }),
        vec![WorkerUnit {
            processors: vec![Box::new(FailEveryNthProcessor { nth: 7, seen: 0 })],
            sinks: vec![Box::new(ListSink { items: Arc::clone(&collected) })],
        }],
    );

    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    pipeline.stop().await;

    // Batch size 1, so every 7th batch (record) is dropped outright: 70 - 10 = 60.
    assert_eq!(collected.lock().unwrap().len(), 60);
    assert_eq!(pipeline.state(), pipeline::PipelineState::Stopped);
}
