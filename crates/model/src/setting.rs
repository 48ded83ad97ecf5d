//! [`PluginSetting`]: the typed configuration node handed to every plugin
//! factory.

use serde_yaml::Value;

use crate::{Error, OptionMap};

/// The four capabilities a plugin can be registered under.
///
/// The plugin registry keys its factories by `(name, kind)`, so the same
/// plugin name can be reused across capabilities without colliding (e.g. a
/// `test` source and a `test` sink).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Kind {
    /// A source plugin.
    Source,
    /// A buffer plugin.
    Buffer,
    /// A processor plugin.
    Processor,
    /// A sink plugin.
    Sink,
}

impl Kind {
    /// A short, lowercase name used in error messages and log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Source => "source",
            Kind::Buffer => "buffer",
            Kind::Processor => "processor",
            Kind::Sink => "sink",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed configuration node: a plugin name, the pipeline it belongs to, and
/// a string-keyed map of options.
///
/// Invariants: the plugin name is non-empty (enforced at construction); the
/// pipeline name is set (via [`PluginSetting::with_pipeline_name`]) before
/// the setting is handed to a plugin factory.
#[derive(Debug, Clone)]
pub struct PluginSetting {
    plugin_name: String,
    pipeline_name: Option<String>,
    options: OptionMap,
}

impl PluginSetting {
    /// Creates a new plugin setting. Fails if `plugin_name` is empty.
    pub fn new(plugin_name: impl Into<String>, options: OptionMap) -> Result<Self, Error> {
        let plugin_name = plugin_name.into();
        if plugin_name.is_empty() {
            return Err(Error::EmptyPluginName);
        }
        Ok(Self {
            plugin_name,
            pipeline_name: None,
            options,
        })
    }

    /// Attaches the owning pipeline's name. Must be called before the
    /// setting is handed to a plugin factory.
    #[must_use]
    pub fn with_pipeline_name(mut self, pipeline_name: impl Into<String>) -> Self {
        self.pipeline_name = Some(pipeline_name.into());
        self
    }

    /// The plugin name, e.g. `"grok"` or `"opensearch"`.
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// The pipeline name, if it has been attached.
    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    /// Returns the pipeline name or `Error::PipelineNameNotSet`. Plugin
    /// factories call this to enforce the invariant instead of silently
    /// defaulting.
    pub fn require_pipeline_name(&self) -> Result<&str, Error> {
        self.pipeline_name
            .as_deref()
            .ok_or_else(|| Error::PipelineNameNotSet {
                plugin_name: self.plugin_name.clone(),
            })
    }

    /// A string option, or `default` if absent or not a string.
    pub fn get_string(&self, key: &str, default: impl Into<String>) -> String {
        match self.options.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.into(),
        }
    }

    /// An integer option, or `default` if absent or not an integer.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.options.get(key) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
            _ => default,
        }
    }

    /// A boolean option, or `default` if absent or not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.options.get(key) {
            Some(Value::Bool(b)) => *b,
            _ => default,
        }
    }

    /// A list option, or an empty list if absent or not a sequence.
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        match self.options.get(key) {
            Some(Value::Sequence(seq)) => seq.clone(),
            _ => Vec::new(),
        }
    }

    /// A nested-mapping option as raw YAML, or `Value::Null` if absent.
    pub fn get_submap(&self, key: &str) -> Value {
        self.options.get(key).cloned().unwrap_or(Value::Null)
    }

    /// The raw options map, for plugins that want to deserialize their
    /// configuration with `serde` directly.
    pub fn options(&self) -> &OptionMap {
        &self.options
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_plugin_name_rejected() {
        assert!(matches!(
            PluginSetting::new("", OptionMap::new()),
            Err(Error::EmptyPluginName)
        ));
    }

    #[test]
    fn pipeline_name_required_before_use() {
        let setting = PluginSetting::new("grok", OptionMap::new()).unwrap();
        assert!(matches!(
            setting.require_pipeline_name(),
            Err(Error::PipelineNameNotSet { .. })
        ));

        let setting = setting.with_pipeline_name("my-pipeline");
        assert_eq!(setting.require_pipeline_name().unwrap(), "my-pipeline");
    }

    #[test]
    fn typed_accessors_fall_back_to_defaults() {
        let mut options = OptionMap::new();
        let _ = options.insert("workers".to_string(), Value::Number(4.into()));
        let _ = options.insert("enabled".to_string(), Value::Bool(true));
        let _ = options.insert("name".to_string(), Value::String("grok".into()));

        let setting = PluginSetting::new("grok", options).unwrap();

        assert_eq!(setting.get_int("workers", 1), 4);
        assert_eq!(setting.get_int("missing", 1), 1);
        assert!(setting.get_bool("enabled", false));
        assert_eq!(setting.get_string("name", "default"), "grok");
        assert_eq!(setting.get_string("missing", "default"), "default");
        assert!(setting.get_list("missing").is_empty());
    }
}
