//! Test doubles shared by the top-level integration suite. Each plugin here
//! mirrors the shape of the demo plugins in `src/plugins.rs` but exposes
//! hooks (a shared counter, an artificial failure) that a production plugin
//! would not need.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use async_trait::async_trait;
use buffer::Buffer;
use model::{PluginSetting, Record};
use processor::AsyncProcessor;
use sink::AsyncSink;
use source::{AsyncSource, SourceFactory, StopSignal};

/// Writes `0..count` as soon as it starts, then waits to be told to stop.
pub struct CountingSource {
    pub count: u32,
}

#[async_trait]
impl AsyncSource<u32> for CountingSource {
    async fn start(&mut self, buffer: Arc<dyn Buffer<u32>>, mut stop_signal: StopSignal) -> Result<(), source::Error> {
        for i in 0..self.count {
            let _ = buffer.write(Record::new(i), Duration::from_millis(200)).await;
        }
        stop_signal.stopped().await;
        Ok(())
    }
}

pub struct CountingSourceFactory {
    pub count: u32,
}

impl SourceFactory<u32> for CountingSourceFactory {
    fn name(&self) -> &str {
        "counting"
    }

    fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncSource<u32>>, source::Error> {
        Ok(Box::new(CountingSource { count: self.count }))
    }
}

/// Appends every record it sees to a shared, lock-guarded `Vec`.
#[derive(Default, Clone)]
pub struct ListSink {
    pub items: Arc<StdMutex<Vec<u32>>>,
}

#[async_trait]
impl AsyncSink<u32> for ListSink {
    async fn output(&mut self, batch: Vec<Record<u32>>) -> Result<(), sink::Error> {
        self.items.lock().expect("list sink lock poisoned").extend(batch.into_iter().map(Record::into_payload));
        Ok(())
    }
}

pub struct ListSinkFactory {
    pub items: Arc<StdMutex<Vec<u32>>>,
}

impl sink::SinkFactory<u32> for ListSinkFactory {
    fn name(&self) -> &str {
        "list"
    }

    fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncSink<u32>>, sink::Error> {
        Ok(Box::new(ListSink { items: Arc::clone(&self.items) }))
    }
}

/// Fails every `nth` record it processes (1-indexed): the whole batch
/// containing that record is rejected, so the worker drops it.
pub struct FailEveryNthProcessor {
    pub nth: u32,
    pub seen: u32,
}

#[async_trait]
impl AsyncProcessor<u32> for FailEveryNthProcessor {
    async fn execute(&mut self, batch: Vec<Record<u32>>) -> Result<Vec<Record<u32>>, processor::Error> {
        self.seen += 1;
        if self.seen % self.nth == 0 {
            return Err(processor::Error::Processor {
                processor: "fail-every-nth".to_string(),
                error: "synthetic failure".to_string(),
                context: Default::default(),
            });
        }
        Ok(batch)
    }
}

pub struct FailEveryNthProcessorFactory {
    pub nth: u32,
}

impl processor::ProcessorFactory<u32> for FailEveryNthProcessorFactory {
    fn name(&self) -> &str {
        "fail_every_nth"
    }

    fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncProcessor<u32>>, processor::Error> {
        Ok(Box::new(FailEveryNthProcessor { nth: self.nth, seen: 0 }))
    }
}

/// A sink whose `output` never returns, used to exercise the pipeline's
/// bounded drain deadline on shutdown.
pub struct BlockingSink;

#[async_trait]
impl AsyncSink<u32> for BlockingSink {
    async fn output(&mut self, _batch: Vec<Record<u32>>) -> Result<(), sink::Error> {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }
}

pub struct BlockingSinkFactory;

impl sink::SinkFactory<u32> for BlockingSinkFactory {
    fn name(&self) -> &str {
        "blocking"
    }

    fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncSink<u32>>, sink::Error> {
        Ok(Box::new(BlockingSink))
    }
}
