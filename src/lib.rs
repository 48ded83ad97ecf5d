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

//! `prepper`: a pluggable, multi-pipeline data-ingestion runtime. Wires the
//! `parser`, `registry`, `manager`, and `server` crates into a runnable
//! process; see each crate for the component it implements.

mod bootstrap;
pub mod plugins;

pub use bootstrap::{default_registry, run};

/// All the errors that can abort the `prepper` process.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A configuration file could not be read from disk.
    #[error("failed to read '{file}': {message}")]
    Io {
        /// The path that could not be read.
        file: String,
        /// The underlying I/O error message.
        message: String,
    },

    /// The pipeline configuration or DAG was invalid.
    #[error(transparent)]
    Parser(#[from] parser::Error),

    /// The pipeline manager could not be constructed.
    #[error(transparent)]
    Manager(#[from] manager::Error),

    /// The server configuration could not be loaded.
    #[error(transparent)]
    Server(#[from] server::Error),

    /// One or more pipelines failed to start. This is fatal to the
    /// process even though the manager itself treats it as per-pipeline and
    /// keeps the rest running.
    #[error("{} pipeline(s) failed to start", .0.len())]
    PipelinesFailedToStart(Vec<manager::Error>),
}
