//! End-to-end scenario 6: a configuration where pipeline `x`'s sink
//! references `y` and `y`'s sink references `x` forms a cycle. DAG
//! construction must fail before any pipeline object exists, so no pipeline
//! ever starts.

mod common;

use std::sync::Arc;

use common::{CountingSourceFactory, ListSinkFactory};
use registry::Registry as PluginRegistry;

#[test]
fn a_cycle_between_two_pipelines_is_rejected_before_any_pipeline_starts() {
    let mut plugin_registry: PluginRegistry<u32> = PluginRegistry::new();
    plugin_registry.register_source(Arc::new(CountingSourceFactory { count: 1 })).unwrap();
    plugin_registry
        .register_sink(Arc::new(ListSinkFactory { items: Default::default() }))
        .unwrap();

    let yaml = r#"
x:
  source:
    counting: {}
  sink:
    - pipeline:
        name: y
y:
  source:
    pipeline:
      name: x
  sink:
    - pipeline:
        name: x
"#;

    let raw = parser::parse(yaml).unwrap();
    let result = parser::build(raw, &plugin_registry);

    assert!(matches!(result, Err(parser::Error::InvalidConfiguration { .. })));
}
