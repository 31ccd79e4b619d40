//! Outputs
//!
//! An output is an async sink at the end of the pipeline. Push outputs
//! receive events (or raw bytes plus metadata) as they flow; pull
//! outputs buffer into the TTL cache and serve on demand. Outputs fail
//! independently: one sink rejecting a write never blocks delivery to
//! the others.

pub mod pull;
pub mod stdout;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use virta_core::{EventMsg, PluginConfig, PluginError, TargetConfig};

pub use crate::cache::Meta;
pub use pull::PullOutput;
pub use stdout::StdoutOutput;

use crate::processors::ProcessorRegistry;

/// Shared collector state handed to each output at init
#[derive(Clone, Default)]
pub struct OutputOptions {
    /// Processor registry for building this output's chain
    pub registry: Arc<ProcessorRegistry>,
    /// All named processor definitions known to the collector
    pub processor_definitions: HashMap<String, PluginConfig>,
    /// Snapshot of the known target configurations
    pub targets: HashMap<String, TargetConfig>,
}

/// An async event sink
#[async_trait]
pub trait Output: Send + Sync {
    /// Decode configuration and prepare the sink
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] on invalid configuration.
    async fn init(
        &mut self,
        name: &str,
        cfg: &PluginConfig,
        opts: OutputOptions,
    ) -> Result<(), PluginError>;

    /// Write a raw payload with its transport metadata
    ///
    /// The default decodes the payload as an event batch and forwards
    /// each event to [`Output::write_event`].
    async fn write(&self, data: Bytes, meta: &Meta) -> Result<(), PluginError> {
        let _ = meta;
        for ev in virta_core::decode_event_batch(&data)? {
            self.write_event(&ev).await?;
        }
        Ok(())
    }

    /// Write one event
    async fn write_event(&self, ev: &EventMsg) -> Result<(), PluginError>;

    /// Flush and release the sink
    async fn close(&self) -> Result<(), PluginError>;
}

type Constructor = fn() -> Box<dyn Output>;

/// Registry mapping output type names to constructors
#[derive(Default)]
pub struct OutputRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl OutputRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in output types registered
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(stdout::OUTPUT_TYPE, || Box::<StdoutOutput>::default());
        reg.register(pull::OUTPUT_TYPE, || Box::<PullOutput>::default());
        reg
    }

    /// Register a constructor under a type name
    pub fn register(&mut self, type_name: &'static str, ctor: Constructor) {
        self.constructors.insert(type_name, ctor);
    }

    /// Instantiate an output by type name
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Output>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }
}

impl std::fmt::Debug for OutputRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("OutputRegistry")
            .field("types", &names)
            .finish()
    }
}

/// The collector's live set of named output instances
#[derive(Default)]
pub struct Outputs {
    outputs: RwLock<HashMap<String, Arc<dyn Output>>>,
}

impl Outputs {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an output under a name
    pub fn add(&self, name: impl Into<String>, output: Arc<dyn Output>) {
        self.outputs.write().insert(name.into(), output);
    }

    /// Remove an output, returning it for the caller to close
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Output>> {
        self.outputs.write().remove(name)
    }

    /// Look up one output by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Output>> {
        self.outputs.read().get(name).cloned()
    }

    /// Resolve a list of output names for an input's configuration
    ///
    /// An empty list selects every known output.
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] naming the first unknown output.
    pub fn select(&self, names: &[String]) -> Result<HashMap<String, Arc<dyn Output>>, PluginError> {
        let outputs = self.outputs.read();
        if names.is_empty() {
            return Ok(outputs.clone());
        }
        let mut selected = HashMap::with_capacity(names.len());
        for name in names {
            let output = outputs
                .get(name)
                .cloned()
                .ok_or_else(|| PluginError::Config(format!("unknown output {name:?}")))?;
            selected.insert(name.clone(), output);
        }
        Ok(selected)
    }

    /// Number of registered outputs
    pub fn len(&self) -> usize {
        self.outputs.read().len()
    }

    /// Whether no outputs are registered
    pub fn is_empty(&self) -> bool {
        self.outputs.read().is_empty()
    }
}

/// Deliver one event to every output, continuing past failures
pub async fn fan_out(outputs: &HashMap<String, Arc<dyn Output>>, ev: &EventMsg) {
    for (name, output) in outputs {
        if let Err(err) = output.write_event(ev).await {
            tracing::warn!(output = %name, error = %err, "output write failed");
        }
    }
}

/// Deliver a raw payload to every output, continuing past failures
pub async fn fan_out_raw(outputs: &HashMap<String, Arc<dyn Output>>, data: &Bytes, meta: &Meta) {
    for (name, output) in outputs {
        if let Err(err) = output.write(data.clone(), meta).await {
            tracing::warn!(output = %name, error = %err, "output write failed");
        }
    }
}
