//! Actions
//!
//! An action is an async side effect triggered by the collector: running
//! a script on the host or calling an HTTP endpoint. Actions receive an
//! [`ActionContext`] carrying the triggering input plus the results of
//! previously-run actions, and return a JSON result that later actions
//! in the same sequence can read.
//!
//! Like processors, actions are instantiated by type name through a
//! registry and configured from open maps.

pub mod http;
pub mod script;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use virta_core::{single_entry, PluginConfig, PluginError, TargetConfig};

pub use http::HttpAction;
pub use script::ScriptAction;

/// Input and accumulated state handed to each action run
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    /// The triggering input, usually an encoded event batch
    pub input: Value,
    /// Results of previously-run actions in this sequence, keyed by
    /// action name
    pub env: HashMap<String, Value>,
    /// Free-form variables supplied by the caller
    pub vars: HashMap<String, Value>,
    /// Snapshot of the known target configurations
    pub targets: HashMap<String, TargetConfig>,
}

impl ActionContext {
    /// A context carrying only an input
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }
}

/// An async side effect with a JSON result
#[async_trait]
pub trait Action: Send + Sync {
    /// Decode and validate this action's configuration
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] when the configuration does not
    /// decode or fails validation.
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError>;

    /// Execute the action
    async fn run(&self, ctx: &ActionContext) -> Result<Value, PluginError>;

    /// The configured instance name
    fn name(&self) -> &str;

    /// Receive a snapshot of the known target configurations
    fn with_targets(&mut self, _targets: &HashMap<String, TargetConfig>) {}
}

type Constructor = fn() -> Box<dyn Action>;

/// Registry mapping action type names to constructors
#[derive(Default)]
pub struct ActionRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl ActionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in action types registered
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(script::ACTION_TYPE, || Box::<ScriptAction>::default());
        reg.register(http::ACTION_TYPE, || Box::<HttpAction>::default());
        reg
    }

    /// Register a constructor under a type name
    pub fn register(&mut self, type_name: &'static str, ctor: Constructor) {
        self.constructors.insert(type_name, ctor);
    }

    /// Instantiate and initialize an action from a single-entry
    /// `{type: config}` definition
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] for a malformed definition, an
    /// unknown type or a failing `init`.
    pub fn build(&self, definition: &PluginConfig) -> Result<Box<dyn Action>, PluginError> {
        let (type_name, cfg) = single_entry(definition)?;
        let mut action = self
            .constructors
            .get(type_name)
            .map(|ctor| ctor())
            .ok_or_else(|| PluginError::Config(format!("unknown action type {type_name:?}")))?;
        action.init(&cfg)?;
        Ok(action)
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("ActionRegistry")
            .field("types", &names)
            .finish()
    }
}

/// Run a sequence of actions, feeding each result to the next
///
/// Each action's result is stored in the context env under the action's
/// name before the next action runs. The first failure aborts the
/// sequence.
///
/// # Errors
/// Propagates the failing action's error.
pub async fn run_sequence(
    actions: &[Box<dyn Action>],
    mut ctx: ActionContext,
) -> Result<HashMap<String, Value>, PluginError> {
    for action in actions {
        let result = action.run(&ctx).await?;
        tracing::debug!(action = %action.name(), "action completed");
        ctx.env.insert(action.name().to_string(), result);
    }
    Ok(ctx.env)
}
