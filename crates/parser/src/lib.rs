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

//! Turns a pipeline configuration file into a runnable set of [`Pipeline`]s:
//! parses the YAML, allocates one [`PipelineConnector`] per edge
//! between pipelines named in the file, detects cycles, and materialises
//! every pipeline through the plugin [`Registry`].
//!
//! [`Pipeline`]: pipeline::Pipeline
//! [`PipelineConnector`]: connector::PipelineConnector
//! [`Registry`]: registry::Registry

mod config;
mod dag;

pub use config::{parse, RawConfig, RawPipelineBlock};
pub use dag::{build, BuiltDag};

/// All the errors configuration parsing and DAG construction can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The configuration is malformed or inconsistent: a plugin block with
    /// the wrong shape, a connector referencing a pipeline that does not
    /// exist, a cycle among connectors, or a pipeline with no sinks.
    #[error("invalid configuration (pipeline: {pipeline}, reason: {reason})")]
    InvalidConfiguration {
        /// The pipeline the problem was found in, or `"<dag>"`/`"<root>"`
        /// for problems that span the whole configuration.
        pipeline: String,
        /// A human-readable explanation.
        reason: String,
    },

    /// A plugin setting could not be constructed (e.g. an empty name).
    #[error(transparent)]
    Model(#[from] model::Error),

    /// A plugin referenced in the configuration could not be resolved or
    /// constructed by the registry.
    #[error(transparent)]
    Registry(#[from] registry::Error),
}
