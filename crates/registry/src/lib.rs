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

//! The plugin registry: a process-wide, write-once table binding
//! `(name, kind)` to a factory, used by the pipeline parser to instantiate
//! plugins named in a pipeline configuration.

use std::{collections::HashMap, sync::Arc};

use buffer::{Buffer, BoundedBlockingBuffer};
use model::{Kind, PluginSetting};
use processor::{AsyncProcessor, ProcessorFactory};
use sink::{AsyncSink, SinkFactory};
use source::{AsyncSource, SourceFactory};

/// All the errors the registry can raise.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No factory is registered for this name and kind.
    #[error("no plugin found (name: {name}, kind: {kind})")]
    NoPluginFound {
        /// The requested plugin name.
        name: String,
        /// The requested plugin kind.
        kind: Kind,
    },

    /// Two factories were registered under the same `(name, kind)`.
    #[error("duplicate plugin registration (name: {name}, kind: {kind})")]
    DuplicatePlugin {
        /// The plugin name.
        name: String,
        /// The plugin kind.
        kind: Kind,
    },

    /// A factory was found but failed to construct the plugin from the
    /// given setting (e.g. a malformed option).
    #[error("plugin construction failed (name: {name}, kind: {kind}, reason: {reason})")]
    PluginConstruction {
        /// The plugin name.
        name: String,
        /// The plugin kind.
        kind: Kind,
        /// The underlying factory error.
        reason: String,
    },
}

/// A buffer factory: the registry's fourth capability, alongside source,
/// processor, and sink. The bounded blocking buffer is the only built-in
/// variant; buffer variants are a closed set in the core runtime.
pub trait BufferFactory<T: Send + 'static>: Send + Sync {
    /// The plugin name this factory is registered under.
    fn name(&self) -> &str;

    /// Builds a new buffer instance.
    fn create(&self, setting: &PluginSetting) -> Arc<dyn Buffer<T>>;
}

struct BoundedBlockingBufferFactory;

impl<T: Send + 'static> BufferFactory<T> for BoundedBlockingBufferFactory {
    fn name(&self) -> &str {
        "bounded_blocking"
    }

    fn create(&self, setting: &PluginSetting) -> Arc<dyn Buffer<T>> {
        let capacity = setting.get_int("buffer_capacity", 512).max(1) as usize;
        let batch_size = setting.get_int("batch_size", 8).max(1) as usize;
        Arc::new(BoundedBlockingBuffer::new(setting.plugin_name().to_string(), capacity, batch_size))
    }
}

/// The process-wide, write-once plugin registry for a single record type
/// `T`. Built during startup from the statically-known set of built-in and
/// test/demo plugins; read-only once the pipeline parser begins
/// materialising pipelines.
pub struct Registry<T: Send + 'static> {
    sources: HashMap<String, Arc<dyn SourceFactory<T>>>,
    processors: HashMap<String, Arc<dyn ProcessorFactory<T>>>,
    sinks: HashMap<String, Arc<dyn SinkFactory<T>>>,
    buffers: HashMap<String, Arc<dyn BufferFactory<T>>>,
}

impl<T: Send + 'static> Default for Registry<T> {
    fn default() -> Self {
        let mut registry = Self {
            sources: HashMap::new(),
            processors: HashMap::new(),
            sinks: HashMap::new(),
            buffers: HashMap::new(),
        };
        registry
            .register_buffer(Arc::new(BoundedBlockingBufferFactory))
            .expect("built-in buffer registration cannot collide");
        registry
    }
}

impl<T: Send + 'static> Registry<T> {
    /// Creates a new registry pre-loaded with the built-in bounded blocking
    /// buffer factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source factory. Fails if `(name, Kind::Source)` is
    /// already bound.
    pub fn register_source(&mut self, factory: Arc<dyn SourceFactory<T>>) -> Result<(), Error> {
        let name = factory.name().to_string();
        if self.sources.insert(name.clone(), factory).is_some() {
            return Err(Error::DuplicatePlugin { name, kind: Kind::Source });
        }
        Ok(())
    }

    /// Registers a processor factory. Fails if `(name, Kind::Processor)` is
    /// already bound.
    pub fn register_processor(&mut self, factory: Arc<dyn ProcessorFactory<T>>) -> Result<(), Error> {
        let name = factory.name().to_string();
        if self.processors.insert(name.clone(), factory).is_some() {
            return Err(Error::DuplicatePlugin { name, kind: Kind::Processor });
        }
        Ok(())
    }

    /// Registers a sink factory. Fails if `(name, Kind::Sink)` is already
    /// bound.
    pub fn register_sink(&mut self, factory: Arc<dyn SinkFactory<T>>) -> Result<(), Error> {
        let name = factory.name().to_string();
        if self.sinks.insert(name.clone(), factory).is_some() {
            return Err(Error::DuplicatePlugin { name, kind: Kind::Sink });
        }
        Ok(())
    }

    /// Registers a buffer factory. Fails if `(name, Kind::Buffer)` is
    /// already bound.
    pub fn register_buffer(&mut self, factory: Arc<dyn BufferFactory<T>>) -> Result<(), Error> {
        let name = factory.name().to_string();
        if self.buffers.insert(name.clone(), factory).is_some() {
            return Err(Error::DuplicatePlugin { name, kind: Kind::Buffer });
        }
        Ok(())
    }

    /// Instantiates a source plugin from `setting`.
    pub fn create_source(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSource<T>>, Error> {
        let name = setting.plugin_name().to_string();
        let factory = self.sources.get(setting.plugin_name()).ok_or_else(|| Error::NoPluginFound {
            name: name.clone(),
            kind: Kind::Source,
        })?;
        factory.create(setting).map_err(|error| Error::PluginConstruction {
            name,
            kind: Kind::Source,
            reason: error.to_string(),
        })
    }

    /// Instantiates a processor plugin from `setting`.
    pub fn create_processor(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncProcessor<T>>, Error> {
        let name = setting.plugin_name().to_string();
        let factory = self.processors.get(setting.plugin_name()).ok_or_else(|| Error::NoPluginFound {
            name: name.clone(),
            kind: Kind::Processor,
        })?;
        factory.create(setting).map_err(|error| Error::PluginConstruction {
            name,
            kind: Kind::Processor,
            reason: error.to_string(),
        })
    }

    /// Instantiates a sink plugin from `setting`.
    pub fn create_sink(&self, setting: &PluginSetting) -> Result<Box<dyn AsyncSink<T>>, Error> {
        let name = setting.plugin_name().to_string();
        let factory = self.sinks.get(setting.plugin_name()).ok_or_else(|| Error::NoPluginFound {
            name: name.clone(),
            kind: Kind::Sink,
        })?;
        factory.create(setting).map_err(|error| Error::PluginConstruction {
            name,
            kind: Kind::Sink,
            reason: error.to_string(),
        })
    }

    /// Instantiates a buffer plugin from `setting`, falling back to
    /// `"bounded_blocking"` when `setting` is `None`.
    pub fn create_buffer(&self, setting: Option<&PluginSetting>, fallback: &PluginSetting) -> Result<Arc<dyn Buffer<T>>, Error> {
        let setting = setting.unwrap_or(fallback);
        self.buffers
            .get(setting.plugin_name())
            .ok_or_else(|| Error::NoPluginFound {
                name: setting.plugin_name().to_string(),
                kind: Kind::Buffer,
            })
            .map(|factory| factory.create(setting))
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;

    use super::*;

    struct EchoFactory;

    struct EchoSource;

    #[async_trait]
    impl AsyncSource<u32> for EchoSource {
        async fn start(&mut self, _buffer: Arc<dyn Buffer<u32>>, mut stop_signal: source::StopSignal) -> Result<(), source::Error> {
            stop_signal.stopped().await;
            Ok(())
        }
    }

    impl SourceFactory<u32> for EchoFactory {
        fn name(&self) -> &str {
            "echo"
        }

        fn create(&self, _setting: &PluginSetting) -> Result<Box<dyn AsyncSource<u32>>, source::Error> {
            Ok(Box::new(EchoSource))
        }
    }

    #[test]
    fn unknown_plugin_name_fails_lookup() {
        let registry: Registry<u32> = Registry::new();
        let setting = PluginSetting::new("missing", Default::default()).unwrap();
        assert!(matches!(registry.create_source(&setting), Err(Error::NoPluginFound { .. })));
    }

    #[test]
    fn registered_plugin_resolves_by_name() {
        let mut registry: Registry<u32> = Registry::new();
        registry.register_source(Arc::new(EchoFactory)).unwrap();

        let setting = PluginSetting::new("echo", Default::default()).unwrap();
        assert!(registry.create_source(&setting).is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry: Registry<u32> = Registry::new();
        registry.register_source(Arc::new(EchoFactory)).unwrap();
        assert!(matches!(
            registry.register_source(Arc::new(EchoFactory)),
            Err(Error::DuplicatePlugin { .. })
        ));
    }

    #[test]
    fn built_in_bounded_blocking_buffer_is_preregistered() {
        let registry: Registry<u32> = Registry::new();
        let setting = PluginSetting::new("bounded_blocking", Default::default()).unwrap();
        assert!(registry.create_buffer(None, &setting).is_ok());
    }
}
