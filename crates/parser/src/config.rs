//! Raw, `serde`-deserializable shapes of the pipeline configuration file:
//! a mapping from pipeline name to pipeline block.

use std::collections::HashMap;

use model::{OptionMap, PluginSetting};
use serde::Deserialize;
use serde_yaml::Value;

use crate::Error;

/// A plugin block: `{ <plugin-name>: <options-map> }`. Deserialized
/// structurally as a single-key mapping and converted to a [`PluginSetting`]
/// once the owning pipeline's name is known.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPluginBlock(HashMap<String, Value>);

impl RawPluginBlock {
    /// The declared plugin name, if the block is well-formed (exactly one
    /// key).
    pub fn plugin_name(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    /// The pipeline name this block refers to, if it is a pipeline-connector
    /// reference rather than a plugin block: `{ pipeline: { name: "<other
    /// pipeline>" } }`. Distinguishes a connector reference from a plugin
    /// that merely happens to share a name with another pipeline.
    pub fn connector_target(&self) -> Option<&str> {
        let (name, value) = self.0.iter().next()?;
        if name != "pipeline" {
            return None;
        }
        match value {
            Value::Mapping(mapping) => mapping.iter().find_map(|(k, v)| match (k.as_str(), v.as_str()) {
                (Some("name"), Some(name)) => Some(name),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Converts this block into a [`PluginSetting`] bound to `pipeline_name`.
    pub fn into_setting(self, pipeline_name: &str) -> Result<PluginSetting, Error> {
        let mut entries = self.0.into_iter();
        let (name, value) = entries.next().ok_or_else(|| Error::InvalidConfiguration {
            pipeline: pipeline_name.to_string(),
            reason: "plugin block must declare exactly one plugin name".to_string(),
        })?;
        if entries.next().is_some() {
            return Err(Error::InvalidConfiguration {
                pipeline: pipeline_name.to_string(),
                reason: format!("plugin block '{name}' declares more than one plugin name"),
            });
        }

        let options = match value {
            Value::Mapping(mapping) => mapping
                .into_iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v)))
                .collect(),
            Value::Null => OptionMap::new(),
            other => {
                let mut options = OptionMap::new();
                let _ = options.insert("value".to_string(), other);
                options
            }
        };

        Ok(PluginSetting::new(name, options)?.with_pipeline_name(pipeline_name))
    }
}

fn default_workers() -> usize {
    1
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    8
}

fn default_buffer_capacity() -> usize {
    512
}

/// One pipeline's configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineBlock {
    /// The source plugin block, or a reference to another pipeline's name
    /// when this pipeline is fed by a connector.
    pub source: RawPluginBlock,
    /// The buffer plugin block. Defaults to the bounded blocking buffer.
    #[serde(default)]
    pub buffer: Option<RawPluginBlock>,
    /// The ordered processor chain. May be empty.
    #[serde(default)]
    pub processor: Vec<RawPluginBlock>,
    /// The sink plugin blocks, or references to other pipelines' names when
    /// this pipeline fans out via connectors. Must be non-empty.
    pub sink: Vec<RawPluginBlock>,
    /// Number of concurrent worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Sleep, in milliseconds, applied after an empty read.
    #[serde(default = "default_delay_ms")]
    pub delay: u64,
    /// How long, in milliseconds, a worker's read call may block.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout: u64,
    /// Default buffer batch size, used when `buffer` is not set.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Default buffer capacity, used when `buffer` is not set.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

/// The top-level pipeline configuration: pipeline name → pipeline block.
pub type RawConfig = HashMap<String, RawPipelineBlock>;

/// Parses a pipeline configuration file's YAML text.
pub fn parse(yaml: &str) -> Result<RawConfig, Error> {
    serde_yaml::from_str(yaml).map_err(|error| Error::InvalidConfiguration {
        pipeline: "<root>".to_string(),
        reason: error.to_string(),
    })
}
