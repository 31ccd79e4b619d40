//! `event-add-tag` processor
//!
//! Adds a fixed set of tags to every event that matches a condition
//! expression or any of the configured name/value regexes. Existing tags
//! win unless `overwrite` is set.

use std::collections::HashMap;

use regex::Regex;
use serde::Deserialize;
use virta_core::{scalar_to_string, EventMsg, PluginConfig, PluginError};

use super::condition::Condition;
use super::Processor;

/// Registry type name
pub const PROCESSOR_TYPE: &str = "event-add-tag";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Condition expression, matched against each event
    condition: String,
    /// Regexes matched against tag values
    tags: Vec<String>,
    /// Regexes matched against value contents (rendered as strings)
    values: Vec<String>,
    /// Regexes matched against tag names
    tag_names: Vec<String>,
    /// Regexes matched against value names
    value_names: Vec<String>,
    /// Replace tags that already exist on the event
    overwrite: bool,
    /// Tags added to matching events
    add: HashMap<String, String>,
}

/// Tag-adding processor, see the module docs
#[derive(Debug, Default)]
pub struct AddTag {
    condition: Option<Condition>,
    tags: Vec<Regex>,
    values: Vec<Regex>,
    tag_names: Vec<Regex>,
    value_names: Vec<Regex>,
    overwrite: bool,
    add: HashMap<String, String>,
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, PluginError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| PluginError::Config(format!("invalid regex {p:?}: {e}")))
        })
        .collect()
}

impl AddTag {
    fn matches(&self, ev: &EventMsg) -> bool {
        if let Some(cond) = &self.condition {
            match cond.eval(ev) {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(condition = %cond.source(), error = %err, "condition evaluation failed");
                }
            }
        }
        for (name, value) in &ev.tags {
            if self.tag_names.iter().any(|re| re.is_match(name))
                || self.tags.iter().any(|re| re.is_match(value))
            {
                return true;
            }
        }
        for (name, value) in &ev.values {
            if self.value_names.iter().any(|re| re.is_match(name)) {
                return true;
            }
            if !self.values.is_empty() {
                let rendered = scalar_to_string(value);
                if self.values.iter().any(|re| re.is_match(&rendered)) {
                    return true;
                }
            }
        }
        false
    }
}

impl Processor for AddTag {
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        self.condition = if cfg.condition.trim().is_empty() {
            None
        } else {
            Some(Condition::parse(&cfg.condition)?)
        };
        self.tags = compile_all(&cfg.tags)?;
        self.values = compile_all(&cfg.values)?;
        self.tag_names = compile_all(&cfg.tag_names)?;
        self.value_names = compile_all(&cfg.value_names)?;
        self.overwrite = cfg.overwrite;
        self.add = cfg.add;
        Ok(())
    }

    fn apply(&self, mut events: Vec<EventMsg>) -> Vec<EventMsg> {
        for ev in &mut events {
            if !self.matches(ev) {
                continue;
            }
            for (key, value) in &self.add {
                if self.overwrite || !ev.tags.contains_key(key) {
                    ev.tags.insert(key.clone(), value.clone());
                }
            }
        }
        events
    }
}
