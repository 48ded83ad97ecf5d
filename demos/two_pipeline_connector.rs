//! Demonstrates a two-pipeline connector: `upstream` generates
//! records and fans them into `downstream` via a `PipelineConnector`, named
//! simply by referencing `downstream`'s pipeline name as a sink. `downstream`
//! reads from the connector and logs every record.
//!
//! Run with `cargo run --example two_pipeline_connector`.

use std::{sync::Arc, time::Duration};

use prepper::default_registry;
use prometheus::Registry;

const PIPELINE_CONFIG: &str = r#"
upstream:
  source:
    generator:
      prefix: demo
      count: 20
      interval_ms: 10
  sink:
    - pipeline:
        name: downstream
downstream:
  source:
    pipeline:
      name: upstream
  processor:
    - uppercase: {}
  sink:
    - log:
        name: downstream-sink
"#;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let registry = default_registry();
    let raw = parser::parse(PIPELINE_CONFIG).expect("demo configuration is valid");
    let dag = parser::build(raw, &registry).expect("demo configuration has no cycles and every plugin is known");

    let metrics_registry = Registry::new();
    let manager = Arc::new(
        manager::PipelineManager::new(dag.pipelines, dag.start_order, dag.shutdown_order, &metrics_registry)
            .expect("metrics registration cannot collide in a fresh registry"),
    );

    let failures = manager.start().await;
    assert!(failures.is_empty(), "demo pipelines must start cleanly: {failures:?}");

    println!("running: {:?}", manager.list_running_pipelines());

    tokio::time::sleep(Duration::from_millis(500)).await;

    manager.shutdown().await;
    println!("running after shutdown: {:?}", manager.list_running_pipelines());
}
