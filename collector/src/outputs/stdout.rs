//! `stdout` output
//!
//! Writes events as JSON lines to standard output, mainly for local
//! debugging and piping into other tools. Runs its own processor chain
//! so per-output transformations apply even on the console.

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use virta_core::{EventMsg, PluginConfig, PluginError};

use super::{Output, OutputOptions};
use crate::processors::ProcessorChain;

use std::sync::atomic::{AtomicU64, Ordering};

/// Registry type name
pub const OUTPUT_TYPE: &str = "stdout";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Named processor definitions to apply, in order
    event_processors: Vec<String>,
}

/// JSON-lines console output
pub struct StdoutOutput {
    name: String,
    chain: ProcessorChain,
    writer: Mutex<tokio::io::Stdout>,
    written: AtomicU64,
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self {
            name: String::new(),
            chain: ProcessorChain::new(),
            writer: Mutex::new(tokio::io::stdout()),
            written: AtomicU64::new(0),
        }
    }
}

impl StdoutOutput {
    /// Number of events written so far
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Output for StdoutOutput {
    async fn init(
        &mut self,
        name: &str,
        cfg: &PluginConfig,
        opts: OutputOptions,
    ) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        self.name = name.to_string();
        self.chain = ProcessorChain::build(
            &opts.registry,
            &cfg.event_processors,
            &opts.processor_definitions,
        )?;
        self.chain.with_targets(&opts.targets);
        Ok(())
    }

    async fn write_event(&self, ev: &EventMsg) -> Result<(), PluginError> {
        let events = self.chain.apply(vec![ev.clone()]);
        if events.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(events.len() * 128);
        for ev in &events {
            serde_json::to_writer(&mut buf, ev).map_err(|e| PluginError::Write(e.to_string()))?;
            buf.push(b'\n');
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(|e| PluginError::Write(e.to_string()))?;
        self.written
            .fetch_add(events.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> Result<(), PluginError> {
        let mut writer = self.writer.lock().await;
        writer
            .flush()
            .await
            .map_err(|e| PluginError::Write(e.to_string()))?;
        tracing::info!(output = %self.name, written = self.written(), "output closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::processors::ProcessorRegistry;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_init_builds_chain_and_counts_writes() {
        let mut defs = HashMap::new();
        let serde_json::Value::Object(def) = json!({
            "event-add-tag": {"tag-names": [".*"], "add": {"via": "stdout"}}
        }) else {
            unreachable!();
        };
        defs.insert("tagger".to_string(), def);

        let mut out = StdoutOutput::default();
        let serde_json::Value::Object(cfg) = json!({"event-processors": ["tagger"]}) else {
            unreachable!();
        };
        out.init(
            "console",
            &cfg,
            OutputOptions {
                registry: Arc::new(ProcessorRegistry::with_defaults()),
                processor_definitions: defs,
                targets: HashMap::new(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.chain.len(), 1);

        let ev = EventMsg::with_timestamp("sub1", 1);
        out.write_event(&ev).await.unwrap();
        assert_eq!(out.written(), 1);
        out.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_processor_fails_init() {
        let mut out = StdoutOutput::default();
        let serde_json::Value::Object(cfg) = json!({"event-processors": ["missing"]}) else {
            unreachable!();
        };
        let err = out
            .init("console", &cfg, OutputOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
    }
}
