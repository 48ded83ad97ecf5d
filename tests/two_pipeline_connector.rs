//! End-to-end scenario 3: two pipelines joined by a connector. The
//! upstream pipeline's source emits records, which flow through the
//! connector into the downstream pipeline's buffer and out its sink.

mod common;

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use common::{CountingSourceFactory, ListSinkFactory};
use prometheus::Registry;
use registry::Registry as PluginRegistry;

#[tokio::test]
async fn records_flow_from_upstream_through_the_connector_to_downstream() {
    let collected = Arc::new(StdMutex::new(Vec::new()));

    let mut plugin_registry: PluginRegistry<u32> = PluginRegistry::new();
    plugin_registry.register_source(Arc::new(CountingSourceFactory { count: 100 })).unwrap();
    plugin_registry.register_sink(Arc::new(ListSinkFactory { items: Arc::clone(&collected) })).unwrap();

    let yaml = r#"
upstream:
  source:
    counting: {}
  sink:
    - pipeline:
        name: downstream
downstream:
  source:
    pipeline:
      name: upstream
  sink:
    - list: {}
"#;

    let raw = parser::parse(yaml).unwrap();
    let dag = parser::build(raw, &plugin_registry).unwrap();
    assert_eq!(dag.start_order, vec!["downstream".to_string(), "upstream".to_string()]);

    let metrics_registry = Registry::new();
    let manager = manager::PipelineManager::new(dag.pipelines, dag.start_order, dag.shutdown_order, &metrics_registry).unwrap();

    let failures = manager.start().await;
    assert!(failures.is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;
    manager.shutdown().await;

    assert_eq!(collected.lock().unwrap().len(), 100);
    assert!(manager.list_running_pipelines().is_empty());
}
