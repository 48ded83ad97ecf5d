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

//! The data model shared by every pipeline component: the [`Record`] envelope
//! that flows from a source through a buffer and a processor chain to a
//! sink, the [`CheckpointState`] a buffer hands out on `read` and takes back
//! on `checkpoint`, and [`PluginSetting`], the typed configuration node every
//! plugin factory receives.

use std::collections::HashMap;

use serde_yaml::Value;

pub mod setting;

pub use setting::{Kind, PluginSetting};

/// All the errors that can occur while building or reading the data model.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A plugin setting was constructed with an empty plugin name.
    #[error("plugin name must not be empty")]
    EmptyPluginName,

    /// A plugin factory was invoked before the pipeline name was attached to
    /// the setting.
    #[error("pipeline name not set on plugin setting '{plugin_name}'")]
    PipelineNameNotSet {
        /// The name of the plugin whose setting is missing a pipeline name.
        plugin_name: String,
    },

    /// A typed accessor was asked for a key whose value has an incompatible
    /// shape.
    #[error("option '{key}' on plugin '{plugin_name}' has an unexpected type")]
    TypeMismatch {
        /// The plugin the option belongs to.
        plugin_name: String,
        /// The option key.
        key: String,
    },
}

/// An immutable envelope over a payload flowing through a pipeline.
///
/// Records carry no identity beyond their payload: two records with equal
/// payloads are interchangeable from the runtime's point of view. Ordering is
/// preserved from source to sink only within a single worker's batch (see the
/// pipeline's concurrency model).
#[derive(Debug, Clone)]
pub struct Record<T> {
    payload: T,
}

impl<T> Record<T> {
    /// Wraps a payload in a new record.
    pub fn new(payload: T) -> Self {
        Self { payload }
    }

    /// Borrows the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consumes the record, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// A token returned by `Buffer::read` and consumed by `Buffer::checkpoint`.
///
/// It carries the number of records in the batch it was issued for. Buffers
/// that track per-record acknowledgement handles (e.g. to advance a source's
/// own offsets) may extend this in the future; the core runtime only ever
/// needs the record count to release capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointState {
    record_count: usize,
}

impl CheckpointState {
    /// Creates a checkpoint state for a batch of `record_count` records.
    pub fn new(record_count: usize) -> Self {
        Self { record_count }
    }

    /// An empty checkpoint, e.g. for a batch read that timed out with no
    /// records available.
    pub fn empty() -> Self {
        Self { record_count: 0 }
    }

    /// The number of records this checkpoint covers.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// True when this checkpoint covers no records.
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

/// Raw, string-keyed options of a plugin block, before being wrapped in a
/// [`PluginSetting`].
pub type OptionMap = HashMap<String, Value>;
