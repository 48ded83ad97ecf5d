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

//! Definition of the [`AsyncSink`] trait: a pipeline's terminal delivery
//! stage.

use std::collections::HashMap;

use async_trait::async_trait;
use model::{PluginSetting, Record};

/// All the errors a sink plugin can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No plugin is registered under this name and kind.
    #[error("unknown sink (sink: {sink}, type: {sink_type})")]
    UnknownSink {
        /// The name of the sink.
        sink: String,
        /// The declared plugin type.
        sink_type: String,
    },

    /// The sink's configuration node could not be interpreted.
    #[error("invalid configuration (reason: {message}, sink: {sink})")]
    InvalidConfig {
        /// The name of the sink.
        sink: String,
        /// The error message.
        message: String,
    },

    /// The sink failed to deliver a batch. The worker logs this and
    /// continues to the remaining sinks, then checkpoints unconditionally --
    /// the runtime treats any return from `output` (normal or error) as
    /// "batch handled".
    #[error("sink error (sink: {sink}, reason: {error}, context: {context:?})")]
    Sink {
        /// The name of the sink.
        sink: String,
        /// The error message.
        error: String,
        /// Additional context for the error.
        context: HashMap<String, String>,
    },

    /// A connector's sink face refused a record because it (or its
    /// downstream pipeline) has already begun shutting down.
    #[error("connector closed (sink: {sink})")]
    ConnectorClosed {
        /// The name of the connector.
        sink: String,
    },
}

/// A pipeline's terminal delivery stage.
///
/// `output` may block on its own retry discipline; the runtime treats any
/// return, successful or not, as "batch handled" and proceeds to checkpoint.
/// A sink that wants at-least-once delivery to its own downstream must
/// retry internally before returning.
#[async_trait]
pub trait AsyncSink<T: Send + 'static>: Send {
    /// Called once before the sink is used, to acquire resources (e.g. open
    /// a client connection).
    async fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called once the pipeline has stopped, to release resources.
    async fn shutdown(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Delivers `batch` externally.
    async fn output(&mut self, batch: Vec<Record<T>>) -> Result<(), Error>;
}

/// Constructs a sink plugin instance from a [`PluginSetting`].
pub trait SinkFactory<T: Send + 'static>: Send + Sync {
    /// The plugin name this factory is registered under.
    fn name(&self) -> &str;

    /// Builds a new, unstarted sink instance.
    fn create(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSink<T>>, Error>;
}
