//! Inputs
//!
//! An input pulls payloads from an external transport with a pool of
//! worker sessions, decodes them and hands them to the collector's
//! outputs. Workers reconnect forever with a fixed recovery wait; a
//! source being down degrades the input, it never kills it.

pub mod stream;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use virta_core::{PluginConfig, PluginError};

use crate::outputs::Output;
use crate::processors::ProcessorRegistry;

pub use stream::{ChannelBuilder, Consumer, ConsumerBuilder, StreamInput};

/// Shared collector state handed to an input at start
#[derive(Clone, Default)]
pub struct InputOptions {
    /// Outputs this input delivers to, already resolved by name
    pub outputs: HashMap<String, Arc<dyn Output>>,
    /// All named processor definitions known to the collector
    pub processor_definitions: HashMap<String, PluginConfig>,
    /// Processor registry for building this input's chain
    pub registry: Arc<ProcessorRegistry>,
    /// Collector-wide prefix for generated consumer names
    pub name_prefix: String,
}

/// A payload source feeding the pipeline
#[async_trait]
pub trait Input: Send + Sync {
    /// Decode configuration and spawn the worker pool
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] on invalid configuration. A
    /// transport that is down at start is not an error; workers retry.
    async fn start(
        &mut self,
        name: &str,
        cfg: &PluginConfig,
        opts: InputOptions,
    ) -> Result<(), PluginError>;

    /// Stop the workers and drain in-flight messages
    async fn close(&mut self) -> Result<(), PluginError>;
}

/// Wire format of payloads arriving on an input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON-encoded event batches, decoded before processing
    #[default]
    Event,
    /// Opaque bytes forwarded to outputs with transport metadata
    Bytes,
}

/// Lifecycle state of one input worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Establishing a transport session
    Starting,
    /// Connected and receiving payloads
    Consuming,
    /// Session lost, waiting out the recovery interval
    Backoff,
    /// Shut down, either by close or cancellation
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Consuming => "consuming",
            WorkerState::Backoff => "backoff",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_decodes_from_config() {
        #[derive(Deserialize)]
        struct Cfg {
            #[serde(default)]
            format: Format,
        }
        let cfg: Cfg = serde_json::from_str(r#"{"format": "bytes"}"#).unwrap();
        assert_eq!(cfg.format, Format::Bytes);
        let cfg: Cfg = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.format, Format::Event);
        assert!(serde_json::from_str::<Cfg>(r#"{"format": "carrier"}"#).is_err());
    }

    #[test]
    fn test_worker_state_display() {
        assert_eq!(WorkerState::Backoff.to_string(), "backoff");
    }
}
