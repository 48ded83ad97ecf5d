//! Two-phase DAG builder: allocate one [`PipelineConnector`] per edge
//! between pipelines named in the configuration, detect cycles, then
//! materialise each [`Pipeline`] in dependency order.

use std::{collections::HashMap, collections::VecDeque, sync::Arc};

use connector::PipelineConnector;
use pipeline::{Pipeline, PipelineConfig, WorkerUnit};
use registry::Registry;
use source::AsyncSource;

use crate::config::{RawConfig, RawPipelineBlock};
use crate::Error;

/// The result of materialising a configuration: every pipeline, keyed by
/// name, plus the orders the pipeline manager should start and stop them in.
pub struct BuiltDag<T: Send + 'static> {
    /// Every pipeline named in the configuration, ready to `start()`.
    pub pipelines: HashMap<String, Pipeline<T>>,
    /// Start order: pipelines with no outgoing connector (pure sinks) first,
    /// so that a downstream pipeline's buffer exists before any upstream
    /// pipeline can write into it.
    pub start_order: Vec<String>,
    /// Shutdown order: pipelines with no incoming connector (pure sources)
    /// first, so producers stop before the consumers they feed.
    pub shutdown_order: Vec<String>,
}

/// A connector edge, directed from the pipeline that writes into it (the
/// "sink pipeline") to the pipeline whose buffer it feeds (the "source
/// pipeline").
type EdgeKey = (String, String);

/// Resolves a connector-shaped block (`{ pipeline: { name: "<target>" } }`)
/// to its target pipeline name, failing with `InvalidConfiguration` if the
/// reference is dangling.
fn resolve_connector_target(pipeline: &str, target: &str, raw: &RawConfig) -> Result<String, Error> {
    if raw.contains_key(target) {
        Ok(target.to_string())
    } else {
        Err(Error::InvalidConfiguration {
            pipeline: pipeline.to_string(),
            reason: format!("connector references a non-existent pipeline '{target}'"),
        })
    }
}

fn allocate_connectors<T: Send + 'static>(raw: &RawConfig) -> Result<HashMap<EdgeKey, PipelineConnector<T>>, Error> {
    let mut connectors: HashMap<EdgeKey, PipelineConnector<T>> = HashMap::new();

    let mut intern = |key: EdgeKey, connectors: &mut HashMap<EdgeKey, PipelineConnector<T>>| {
        let _ = connectors.entry(key.clone()).or_insert_with(|| {
            let name = format!("{}->{}", key.0, key.1);
            PipelineConnector::new(name, key.0.clone(), key.1.clone())
        });
    };

    for (name, block) in raw {
        for sink_block in &block.sink {
            if let Some(target) = sink_block.connector_target() {
                let target = resolve_connector_target(name, target, raw)?;
                intern((name.clone(), target), &mut connectors);
            }
        }
        if let Some(upstream) = block.source.connector_target() {
            let upstream = resolve_connector_target(name, upstream, raw)?;
            intern((upstream, name.clone()), &mut connectors);
        }
    }

    Ok(connectors)
}

/// Orders pipeline names topologically over the connector graph (edges
/// sink-pipeline → source-pipeline). Returns the order with no incoming
/// edges first. Fails with [`Error::InvalidConfiguration`] if the connector
/// graph is cyclic.
fn topological_order(raw: &RawConfig, connectors: &HashMap<EdgeKey, PipelineConnector<impl Send + 'static>>) -> Result<Vec<String>, Error> {
    let mut indegree: HashMap<String, usize> = raw.keys().map(|name| (name.clone(), 0)).collect();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for (from, to) in connectors.keys() {
        adjacency.entry(from.clone()).or_default().push(to.clone());
        *indegree.get_mut(to).expect("connector targets are always pipeline names") += 1;
    }

    let mut queue: VecDeque<String> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| name.clone())
        .collect();
    let mut order = Vec::with_capacity(raw.len());

    while let Some(name) = queue.pop_front() {
        order.push(name.clone());
        if let Some(successors) = adjacency.get(&name) {
            for successor in successors {
                let degree = indegree.get_mut(successor).expect("successor is a known pipeline");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(successor.clone());
                }
            }
        }
    }

    if order.len() != raw.len() {
        return Err(Error::InvalidConfiguration {
            pipeline: "<dag>".to_string(),
            reason: "cycle detected among pipeline connectors".to_string(),
        });
    }

    Ok(order)
}

fn resolve_source<T: Send + Clone + 'static>(
    name: &str,
    block: &RawPipelineBlock,
    connectors: &HashMap<EdgeKey, PipelineConnector<T>>,
    registry: &Registry<T>,
) -> Result<Box<dyn AsyncSource<T>>, Error> {
    if let Some(target) = block.source.connector_target() {
        if let Some(connector) = connectors.get(&(target.to_string(), name.to_string())) {
            return Ok(Box::new(connector.clone()));
        }
    }
    let setting = block.source.clone().into_setting(name)?;
    Ok(registry.create_source(&setting)?)
}

fn resolve_sinks<T: Send + Clone + 'static>(
    name: &str,
    block: &RawPipelineBlock,
    connectors: &HashMap<EdgeKey, PipelineConnector<T>>,
    registry: &Registry<T>,
) -> Result<Vec<Box<dyn sink::AsyncSink<T>>>, Error> {
    let mut sinks: Vec<Box<dyn sink::AsyncSink<T>>> = Vec::with_capacity(block.sink.len());
    for sink_block in &block.sink {
        if let Some(target) = sink_block.connector_target() {
            if let Some(connector) = connectors.get(&(name.to_string(), target.to_string())) {
                sinks.push(Box::new(connector.clone()));
                continue;
            }
        }
        let setting = sink_block.clone().into_setting(name)?;
        sinks.push(registry.create_sink(&setting)?);
    }
    Ok(sinks)
}

/// Builds every pipeline named in `raw`, wiring connector edges and
/// resolving plugin references through `registry`.
pub fn build<T: Send + Clone + 'static>(raw: RawConfig, registry: &Registry<T>) -> Result<BuiltDag<T>, Error> {
    for (name, block) in &raw {
        if block.sink.is_empty() {
            return Err(Error::InvalidConfiguration {
                pipeline: name.clone(),
                reason: "pipeline declares zero sinks".to_string(),
            });
        }
    }

    let connectors = allocate_connectors::<T>(&raw)?;
    let shutdown_order = topological_order(&raw, &connectors)?;
    let start_order: Vec<String> = shutdown_order.iter().rev().cloned().collect();

    let mut pipelines = HashMap::with_capacity(raw.len());
    for name in &shutdown_order {
        let block = raw.get(name).expect("order is derived from raw's own keys");

        let source = resolve_source(name, block, &connectors, registry)?;

        let buffer_setting = match &block.buffer {
            Some(raw_buffer) => Some(raw_buffer.clone().into_setting(name)?),
            None => None,
        };
        let mut default_options = model::OptionMap::new();
        let _ = default_options.insert("buffer_capacity".to_string(), serde_yaml::Value::Number(block.buffer_capacity.into()));
        let _ = default_options.insert("batch_size".to_string(), serde_yaml::Value::Number(block.batch_size.into()));
        let fallback = model::PluginSetting::new("bounded_blocking", default_options)?.with_pipeline_name(name);
        let buffer = registry.create_buffer(buffer_setting.as_ref(), &fallback)?;

        let worker_count = block.workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let mut processors = Vec::with_capacity(block.processor.len());
            for processor_block in &block.processor {
                let setting = processor_block.clone().into_setting(name)?;
                processors.push(registry.create_processor(&setting)?);
            }
            let sinks = resolve_sinks(name, block, &connectors, registry)?;
            workers.push(WorkerUnit { processors, sinks });
        }

        let config = PipelineConfig {
            workers: worker_count,
            delay: std::time::Duration::from_millis(block.delay),
            read_timeout: std::time::Duration::from_millis(block.read_timeout),
            drain_deadline: std::time::Duration::from_secs(10),
        };

        let _ = pipelines.insert(name.clone(), Pipeline::new(name.clone(), config, buffer, source, workers));
    }

    Ok(BuiltDag {
        pipelines,
        start_order,
        shutdown_order,
    })
}
