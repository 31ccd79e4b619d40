//! Event processors
//!
//! A processor is a synchronous batch transformation applied between an
//! input's decode stage and the outputs. Processors are instantiated by
//! type name through a [`ProcessorRegistry`] and composed into an ordered
//! [`ProcessorChain`]; inputs and pull outputs each build their own chain
//! from the named subset of the collector's processor definitions.
//!
//! Init-time errors (bad condition syntax, invalid regex, unknown type)
//! are fatal. Apply-time expression errors only skip the event at hand:
//! a chain never drops a batch because one event failed to match.

pub mod add_tag;
pub mod condition;
pub mod value_tag;

use std::collections::HashMap;
use std::sync::Arc;

use virta_core::{single_entry, EventMsg, PluginConfig, PluginError, TargetConfig};

use crate::actions::Action;

pub use add_tag::AddTag;
pub use condition::Condition;
pub use value_tag::ValueTag;

/// A batch transformation over event messages
pub trait Processor: Send + Sync {
    /// Decode and validate this processor's configuration
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] when the configuration does not
    /// decode or a compiled part (condition, regex) fails to parse.
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError>;

    /// Transform a batch of events
    ///
    /// Implementations may mutate, drop or add events. Per-event
    /// evaluation failures are logged and leave that event unchanged.
    fn apply(&self, events: Vec<EventMsg>) -> Vec<EventMsg>;

    /// Receive a snapshot of the known target configurations
    ///
    /// Most processors do not care about targets; the default is a no-op.
    fn with_targets(&mut self, _targets: &HashMap<String, TargetConfig>) {}

    /// Receive the collector's initialized actions, for processors that
    /// trigger them
    fn with_actions(&mut self, _actions: &HashMap<String, Arc<dyn Action>>) {}

    /// Receive the full processor definition set, for processors that
    /// nest other processors
    fn with_processors(
        &mut self,
        _definitions: &HashMap<String, PluginConfig>,
        _registry: &ProcessorRegistry,
    ) {
    }
}

type Constructor = fn() -> Box<dyn Processor>;

/// Registry mapping processor type names to constructors
#[derive(Default)]
pub struct ProcessorRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl ProcessorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in processor types registered
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(add_tag::PROCESSOR_TYPE, || Box::<AddTag>::default());
        reg.register(value_tag::PROCESSOR_TYPE, || Box::<ValueTag>::default());
        reg
    }

    /// Register a constructor under a type name
    ///
    /// Re-registering a name replaces the previous constructor.
    pub fn register(&mut self, type_name: &'static str, ctor: Constructor) {
        self.constructors.insert(type_name, ctor);
    }

    /// Instantiate a processor by type name
    pub fn create(&self, type_name: &str) -> Option<Box<dyn Processor>> {
        self.constructors.get(type_name).map(|ctor| ctor())
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ProcessorRegistry")
            .field("types", &names)
            .finish()
    }
}

/// An ordered sequence of initialized processors
#[derive(Default)]
pub struct ProcessorChain {
    processors: Vec<(String, Box<dyn Processor>)>,
}

impl ProcessorChain {
    /// An empty chain, applying no transformation
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from named processor definitions
    ///
    /// `order` lists definition names from `definitions` to include, in
    /// application order. Each definition is a single-entry map from a
    /// registered type name to that processor's configuration.
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] for an unknown definition name,
    /// an unknown processor type or a failing `init`.
    pub fn build(
        registry: &ProcessorRegistry,
        order: &[String],
        definitions: &HashMap<String, PluginConfig>,
    ) -> Result<Self, PluginError> {
        let mut processors = Vec::with_capacity(order.len());
        for name in order {
            let def = definitions.get(name).ok_or_else(|| {
                PluginError::Config(format!("unknown processor definition {name:?}"))
            })?;
            let (type_name, cfg) = single_entry(def)?;
            let mut proc = registry.create(type_name).ok_or_else(|| {
                PluginError::Config(format!(
                    "processor {name:?} has unknown type {type_name:?}"
                ))
            })?;
            proc.init(&cfg)?;
            tracing::debug!(processor = %name, r#type = %type_name, "processor initialized");
            processors.push((name.clone(), proc));
        }
        Ok(Self { processors })
    }

    /// Apply every processor in order
    pub fn apply(&self, mut events: Vec<EventMsg>) -> Vec<EventMsg> {
        for (name, proc) in &self.processors {
            let before = events.len();
            events = proc.apply(events);
            tracing::trace!(processor = %name, before, after = events.len(), "processor applied");
        }
        events
    }

    /// Number of processors in the chain
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Forward a target snapshot to every processor
    pub fn with_targets(&mut self, targets: &HashMap<String, TargetConfig>) {
        for (_, proc) in &mut self.processors {
            proc.with_targets(targets);
        }
    }

    /// Forward the collector's initialized actions to every processor
    pub fn with_actions(&mut self, actions: &HashMap<String, Arc<dyn Action>>) {
        for (_, proc) in &mut self.processors {
            proc.with_actions(actions);
        }
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.processors.iter().map(|(n, _)| n).collect();
        f.debug_struct("ProcessorChain")
            .field("processors", &names)
            .finish()
    }
}
