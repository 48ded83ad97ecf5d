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

//! Definition of the [`AsyncSource`] trait: a pipeline's producer of
//! records, pushing into its buffer until told to stop.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use buffer::Buffer;
use model::PluginSetting;
use tokio::sync::watch;

/// All the errors a source plugin can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No plugin is registered under this name and kind.
    #[error("unknown source (source: {source}, type: {source_type})")]
    UnknownSource {
        /// The name of the source.
        source: String,
        /// The declared plugin type.
        source_type: String,
    },

    /// The source's configuration node could not be interpreted.
    #[error("invalid configuration (reason: {message}, source: {source})")]
    InvalidConfig {
        /// The name of the source.
        source: String,
        /// The error message.
        message: String,
    },

    /// The source failed for some reason while running.
    #[error("source error (source: {source}, reason: {error}, context: {context:?})")]
    Source {
        /// The name of the source.
        source: String,
        /// The error message.
        error: String,
        /// Additional context for the error.
        context: HashMap<String, String>,
    },
}

/// The source half of the advisory stop flag described in the concurrency
/// model: a `tokio::sync::watch` receiver a source polls (or awaits) while
/// producing, so that a stop request is cooperative rather than an abrupt
/// future cancellation.
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    /// True once a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop has been requested. Safe to await repeatedly or
    /// concurrently from multiple tasks sharing a clone of this signal.
    pub async fn stopped(&mut self) {
        if *self.0.borrow() {
            return;
        }
        let _ = self.0.wait_for(|stopped| *stopped).await;
    }
}

/// The pipeline-held half of the advisory stop flag: calling
/// [`StopHandle::request_stop`] wakes every clone of the matching
/// [`StopSignal`].
#[derive(Clone)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    /// Requests that every holder of the matching [`StopSignal`] treat
    /// production as cancelled. Idempotent.
    pub fn request_stop(&self) {
        let _ = self.0.send(true);
    }
}

/// Creates a linked [`StopHandle`]/[`StopSignal`] pair, initially un-stopped.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle(tx), StopSignal(rx))
}

/// A pipeline's producer of records.
///
/// `start` begins producing into `buffer`; `stop` requests cessation and
/// must be idempotent and safe to call concurrently with an in-flight
/// `start`. A source may keep producing for a bounded grace window after
/// `stop` is requested; it observes the request cooperatively via
/// `stop_signal` rather than through abrupt cancellation.
#[async_trait]
pub trait AsyncSource<T: Send + 'static>: Send {
    /// Called once before `start`, to acquire resources (e.g. dial a
    /// listener). Must not block indefinitely.
    async fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Called after the pipeline has finished tearing down, to release
    /// resources acquired in `init`.
    async fn shutdown(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Begins producing records into `buffer`. Returns once production has
    /// permanently ceased, either because `stop_signal` was raised or
    /// because of a fatal internal error.
    async fn start(&mut self, buffer: Arc<dyn Buffer<T>>, stop_signal: StopSignal) -> Result<(), Error>;

    /// Requests that the source stop producing. Idempotent; may be called
    /// concurrently with `start`. Most implementations need not override
    /// this: the pipeline raises `stop_signal` (observed by `start`) before
    /// calling this hook, which exists for plugins with their own
    /// out-of-band shutdown trigger (e.g. closing a listening socket).
    async fn stop(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Constructs a source plugin instance from a [`PluginSetting`].
pub trait SourceFactory<T: Send + 'static>: Send + Sync {
    /// The plugin name this factory is registered under.
    fn name(&self) -> &str;

    /// Builds a new, unstarted source instance. Must not perform blocking
    /// I/O; that belongs in [`AsyncSource::init`] or `start`.
    fn create(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSource<T>>, Error>;
}
