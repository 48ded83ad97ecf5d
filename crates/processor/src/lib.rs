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

//! Definition of the [`AsyncProcessor`] trait: a pure batch transformation
//! stage in a pipeline's processor chain.

use std::collections::HashMap;

use async_trait::async_trait;
use model::{PluginSetting, Record};

/// All the errors a processor plugin can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No plugin is registered under this name and kind.
    #[error("unknown processor (processor: {processor}, type: {processor_type})")]
    UnknownProcessor {
        /// The name of the processor.
        processor: String,
        /// The declared plugin type.
        processor_type: String,
    },

    /// The processor's configuration node could not be interpreted.
    #[error("invalid configuration (reason: {message}, processor: {processor})")]
    InvalidConfig {
        /// The name of the processor.
        processor: String,
        /// The error message.
        message: String,
    },

    /// The processor threw while transforming a batch. The worker logs this
    /// and drops the batch, then checkpoints so backpressure clears.
    #[error("processor error (processor: {processor}, reason: {error}, context: {context:?})")]
    Processor {
        /// The name of the processor.
        processor: String,
        /// The error message.
        error: String,
        /// Additional context for the error.
        context: HashMap<String, String>,
    },
}

/// A pure transformation from one batch of records to another.
///
/// Implementations must not block on external I/O indefinitely; any
/// deadline-bound operation should use its own internal timeout. An error
/// returned here is caught by the worker, logged, and the offending batch is
/// dropped (after checkpoint) rather than propagated further.
#[async_trait]
pub trait AsyncProcessor<T: Send + 'static>: Send {
    /// Called once before the processor is used, to acquire resources.
    async fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the pipeline has stopped, to release resources.
    async fn shutdown(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Transforms `batch` into the next batch. May shrink, grow, or replace
    /// records.
    async fn execute(&mut self, batch: Vec<Record<T>>) -> Result<Vec<Record<T>>, Error>;
}

/// Constructs a processor plugin instance from a [`PluginSetting`].
pub trait ProcessorFactory<T: Send + 'static>: Send + Sync {
    /// The plugin name this factory is registered under.
    fn name(&self) -> &str;

    /// Builds a new, unstarted processor instance.
    fn create(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncProcessor<T>>, Error>;
}
