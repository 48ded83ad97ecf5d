//! Process entry point. Wires a `tracing-subscriber` formatter before
//! anything else runs, then hands off to [`prepper::run`] on a manually
//! built multi-threaded Tokio runtime.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;

/// Pluggable, multi-pipeline data-ingestion runtime.
#[derive(Parser, Debug)]
#[command(name = "prepper", version, about)]
struct Cli {
    /// Path to the pipeline configuration file.
    #[arg(long, default_value = "pipeline.yaml")]
    pipeline_config: PathBuf,

    /// Path to the server (control API) configuration file. Defaults are
    /// used when omitted.
    #[arg(long)]
    server_config: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    if let Err(error) = color_eyre::install() {
        tracing::warn!(%error, "color-eyre already installed");
    }

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to build the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(prepper::run(&cli.pipeline_config, cli.server_config.as_ref())) {
        Ok(()) => {
            tracing::info!("prepper stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(%error, "prepper aborted");
            ExitCode::FAILURE
        }
    }
}
