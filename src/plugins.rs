//! In-process demo plugins: a small, statically-known set of built-in
//! sources, processors, and sinks. These are the only source/processor/sink
//! plugins the `prepper` binary registers by default; real external I/O
//! plugins are out of scope.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use buffer::Buffer;
use model::{PluginSetting, Record};
use processor::AsyncProcessor;
use sink::AsyncSink;
use source::{AsyncSource, SourceFactory, StopSignal};
use tracing::info;

/// Emits `count` lines of the form `"<prefix>-<i>"`, waiting `interval_ms`
/// between writes. Stops early if asked to.
pub struct GeneratorSource {
    prefix: String,
    count: u64,
    interval: Duration,
}

#[async_trait]
impl AsyncSource<String> for GeneratorSource {
    async fn start(&mut self, buffer: Arc<dyn Buffer<String>>, mut stop_signal: StopSignal) -> Result<(), source::Error> {
        for i in 0..self.count {
            if stop_signal.is_stopped() {
                break;
            }
            let record = Record::new(format!("{}-{i}", self.prefix));
            if buffer.write(record, Duration::from_secs(5)).await.is_err() {
                break;
            }
            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
        Ok(())
    }
}

/// Builds [`GeneratorSource`] instances. Options: `prefix` (default
/// `"record"`), `count` (default 100), `interval_ms` (default 0).
pub struct GeneratorSourceFactory;

impl SourceFactory<String> for GeneratorSourceFactory {
    fn name(&self) -> &str {
        "generator"
    }

    fn create(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSource<String>>, source::Error> {
        Ok(Box::new(GeneratorSource {
            prefix: setting.get_string("prefix", "record"),
            count: setting.get_int("count", 100).max(0) as u64,
            interval: Duration::from_millis(setting.get_int("interval_ms", 0).max(0) as u64),
        }))
    }
}

/// Upper-cases every record's payload.
pub struct UppercaseProcessor;

#[async_trait]
impl AsyncProcessor<String> for UppercaseProcessor {
    async fn execute(&mut self, batch: Vec<Record<String>>) -> Result<Vec<Record<String>>, processor::Error> {
        Ok(batch.into_iter().map(|record| Record::new(record.into_payload().to_uppercase())).collect())
    }
}

/// Builds [`UppercaseProcessor`] instances. Takes no options.
pub struct UppercaseProcessorFactory;

impl processor::ProcessorFactory<String> for UppercaseProcessorFactory {
    fn name(&self) -> &str {
        "uppercase"
    }

    fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncProcessor<String>>, processor::Error> {
        Ok(Box::new(UppercaseProcessor))
    }
}

/// Logs every record at info level via `tracing`, tagged with this sink
/// instance's configured `name`.
pub struct LogSink {
    name: String,
}

#[async_trait]
impl AsyncSink<String> for LogSink {
    async fn output(&mut self, batch: Vec<Record<String>>) -> Result<(), sink::Error> {
        for record in &batch {
            info!(sink = %self.name, payload = %record.payload(), "record delivered");
        }
        Ok(())
    }
}

/// Builds [`LogSink`] instances. Options: `name` (default `"log"`).
pub struct LogSinkFactory;

impl sink::SinkFactory<String> for LogSinkFactory {
    fn name(&self) -> &str {
        "log"
    }

    fn create(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSink<String>>, sink::Error> {
        Ok(Box::new(LogSink {
            name: setting.get_string("name", "log"),
        }))
    }
}
