//! `pull` output
//!
//! The inverse of a push sink: writes land in the TTL cache and a
//! scraper drains it on demand through [`PullOutput::collect`]. Each
//! collect pass prunes expired metadata, reads every fresh batch,
//! merges the batch's stored metadata into the event tags, runs the
//! output's processor chain and flattens numeric values into labeled
//! samples.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use virta_core::{EventMsg, PluginConfig, PluginError};

use super::{Meta, Output, OutputOptions};
use crate::cache::{CacheConfig, TtlCache};
use crate::processors::ProcessorChain;

/// Registry type name
pub const OUTPUT_TYPE: &str = "pull";

/// Metadata key naming the subscription a payload belongs to
pub const META_SUBSCRIPTION: &str = "subscription-name";
/// Metadata key naming the originating target
pub const META_SOURCE: &str = "source";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Cache tuning
    cache: CacheConfig,
    /// Named processor definitions to apply at collect time, in order
    event_processors: Vec<String>,
    /// Prefix prepended to every sample name
    metric_prefix: String,
}

/// One scraped measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sanitized sample name
    pub name: String,
    /// Event tags at collect time
    pub labels: HashMap<String, String>,
    /// Numeric value
    pub value: f64,
    /// Event timestamp, nanoseconds
    pub timestamp: i64,
}

/// Cache-backed pull output
#[derive(Default)]
pub struct PullOutput {
    name: String,
    cache: TtlCache,
    chain: ProcessorChain,
    metric_prefix: String,
}

/// Sample names allow only `[a-zA-Z0-9_:]`
fn sanitize_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

impl PullOutput {
    fn cache_key(&self, events: &[EventMsg], meta: &Meta) -> (String, String) {
        let subscription = meta
            .get(META_SUBSCRIPTION)
            .cloned()
            .or_else(|| events.first().map(|ev| ev.name.clone()))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let target = meta.get(META_SOURCE).cloned().unwrap_or_default();
        (subscription, target)
    }

    /// Drain the cache into samples
    ///
    /// Non-destructive with respect to unexpired entries; the same
    /// samples are served again until their batches expire or are
    /// replaced.
    pub fn collect(&self) -> Vec<Sample> {
        let pruned = self.cache.delete_expired_meta();
        if pruned > 0 {
            tracing::debug!(output = %self.name, pruned, "expired metadata pruned");
        }

        let mut samples = Vec::new();
        let mut cached = 0usize;
        for batch in self.cache.read_entries() {
            cached += batch.events.len();
            let meta = self.cache.get_meta(&batch.subscription, &batch.target);
            let mut events = batch.events;
            for ev in &mut events {
                ev.tags
                    .entry(META_SUBSCRIPTION.to_string())
                    .or_insert_with(|| batch.subscription.clone());
                // Stored metadata becomes labels; event tags win on clash.
                if let Some(meta) = &meta {
                    for (key, value) in meta {
                        ev.tags
                            .entry(key.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            let events = self.chain.apply(events);
            for ev in events {
                for (key, value) in &ev.values {
                    let Some(value) = numeric(value) else {
                        continue;
                    };
                    let name = if self.metric_prefix.is_empty() {
                        sanitize_name(key)
                    } else {
                        sanitize_name(&format!("{}_{key}", self.metric_prefix))
                    };
                    samples.push(Sample {
                        name,
                        labels: ev.tags.clone(),
                        value,
                        timestamp: ev.timestamp,
                    });
                }
            }
        }
        tracing::debug!(output = %self.name, cached, samples = samples.len(), "collected from cache");
        samples
    }
}

#[async_trait::async_trait]
impl Output for PullOutput {
    async fn init(
        &mut self,
        name: &str,
        cfg: &PluginConfig,
        opts: OutputOptions,
    ) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        self.name = name.to_string();
        self.cache = TtlCache::new(cfg.cache);
        self.chain = ProcessorChain::build(
            &opts.registry,
            &cfg.event_processors,
            &opts.processor_definitions,
        )?;
        self.chain.with_targets(&opts.targets);
        self.metric_prefix = cfg.metric_prefix;
        Ok(())
    }

    async fn write(&self, data: Bytes, meta: &Meta) -> Result<(), PluginError> {
        let events = virta_core::decode_event_batch(&data)?;
        let (subscription, target) = self.cache_key(&events, meta);
        self.cache.write(&subscription, &target, events, meta.clone());
        Ok(())
    }

    async fn write_event(&self, ev: &EventMsg) -> Result<(), PluginError> {
        let mut meta = Meta::new();
        if let Some(source) = ev.tags.get(META_SOURCE) {
            meta.insert(META_SOURCE.to_string(), source.clone());
        }
        let (subscription, target) = self.cache_key(std::slice::from_ref(ev), &meta);
        self.cache
            .write(&subscription, &target, vec![ev.clone()], meta);
        Ok(())
    }

    async fn close(&self) -> Result<(), PluginError> {
        tracing::info!(output = %self.name, entries = self.cache.len(), "output closed");
        Ok(())
    }
}
