//! `event-value-tag` processor
//!
//! Promotes one value field to a tag and propagates it across the batch.
//! Every event carrying the configured value name donates its value; the
//! donated value is then attached as a tag to every event in the batch
//! whose tags include all of the donor's tags. Events that still carry
//! a value under the promoted name keep their own and are never tagged.
//! With `consume` set the value field is removed from donor events
//! first, so a consuming donor receives its own tag.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use virta_core::{scalar_to_string, EventMsg, PluginConfig, PluginError};

use super::Processor;

/// Registry type name
pub const PROCESSOR_TYPE: &str = "event-value-tag";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct Config {
    /// Tag name to write, defaults to `value-name`
    tag_name: String,
    /// Value field to promote, required
    value_name: String,
    /// Remove the value field from donor events
    consume: bool,
}

/// Value-to-tag promoting processor, see the module docs
#[derive(Debug, Default)]
pub struct ValueTag {
    tag_name: String,
    value_name: String,
    consume: bool,
}

/// One donated value and the tag set it was observed under
struct Capture {
    tags: HashMap<String, String>,
    value: Value,
}

/// True when every entry of `subset` appears in `superset` with the same value
fn tags_include(superset: &HashMap<String, String>, subset: &HashMap<String, String>) -> bool {
    subset
        .iter()
        .all(|(k, v)| superset.get(k).is_some_and(|sv| sv == v))
}

impl Processor for ValueTag {
    fn init(&mut self, cfg: &PluginConfig) -> Result<(), PluginError> {
        let cfg: Config = virta_core::decode_config(cfg)?;
        if cfg.value_name.is_empty() {
            return Err(PluginError::Config(
                "event-value-tag requires a non-empty value-name".to_string(),
            ));
        }
        self.tag_name = if cfg.tag_name.is_empty() {
            cfg.value_name.clone()
        } else {
            cfg.tag_name
        };
        self.value_name = cfg.value_name;
        self.consume = cfg.consume;
        Ok(())
    }

    fn apply(&self, mut events: Vec<EventMsg>) -> Vec<EventMsg> {
        // Capture pass: collect (tags, value) from every donor event.
        let mut captures = Vec::new();
        for ev in &mut events {
            if self.consume {
                if let Some(value) = ev.values.remove(&self.value_name) {
                    captures.push(Capture {
                        tags: ev.tags.clone(),
                        value,
                    });
                }
            } else if let Some(value) = ev.values.get(&self.value_name) {
                captures.push(Capture {
                    tags: ev.tags.clone(),
                    value: value.clone(),
                });
            }
        }

        // Propagate pass: tag every event whose tags cover a donor's
        // tags. An event still carrying the value field keeps its own
        // and is never tagged; consuming donors were emptied in the
        // capture pass and so tag themselves.
        for capture in &captures {
            let rendered = scalar_to_string(&capture.value);
            for ev in &mut events {
                if ev.values.contains_key(&self.value_name) {
                    continue;
                }
                if tags_include(&ev.tags, &capture.tags) {
                    ev.tags.insert(self.tag_name.clone(), rendered.clone());
                }
            }
        }
        events
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(cfg: serde_json::Value) -> ValueTag {
        let serde_json::Value::Object(map) = cfg else {
            unreachable!("test configs are objects");
        };
        let mut proc = ValueTag::default();
        proc.init(&map).unwrap();
        proc
    }

    fn donor() -> EventMsg {
        let mut ev = EventMsg::with_timestamp("sub1", 1);
        ev.add_tag("source", "r1");
        ev.add_value("os-version", json!("23.10"));
        ev
    }

    #[test]
    fn test_value_name_required() {
        let mut proc = ValueTag::default();
        let serde_json::Value::Object(map) = json!({"tag-name": "v"}) else {
            unreachable!();
        };
        let err = proc.init(&map).unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
    }

    #[test]
    fn test_propagates_to_matching_tag_sets() {
        let proc = build(json!({"value-name": "os-version"}));

        let mut same_source = EventMsg::with_timestamp("sub1", 2);
        same_source.add_tag("source", "r1");
        same_source.add_tag("interface", "ethernet-1/1");

        let mut other_source = EventMsg::with_timestamp("sub1", 3);
        other_source.add_tag("source", "r2");

        let out = proc.apply(vec![donor(), same_source, other_source]);
        // The donor still holds the value and stays untagged; matching
        // events get the tag, others do not.
        assert!(!out[0].tags.contains_key("os-version"));
        assert_eq!(out[1].tags.get("os-version"), Some(&"23.10".to_string()));
        assert!(!out[2].tags.contains_key("os-version"));
    }

    #[test]
    fn test_donor_without_consume_is_not_tagged() {
        let proc = build(json!({"value-name": "os-version"}));
        let out = proc.apply(vec![donor()]);
        assert!(!out[0].tags.contains_key("os-version"));
        assert_eq!(out[0].values.get("os-version"), Some(&json!("23.10")));
    }

    #[test]
    fn test_custom_tag_name() {
        let proc = build(json!({"value-name": "os-version", "tag-name": "os"}));

        let mut recipient = EventMsg::with_timestamp("sub1", 2);
        recipient.add_tag("source", "r1");
        recipient.add_tag("interface", "ethernet-1/1");

        let out = proc.apply(vec![donor(), recipient]);
        assert_eq!(out[1].tags.get("os"), Some(&"23.10".to_string()));
        // The donor keeps its value field without consume.
        assert_eq!(out[0].values.get("os-version"), Some(&json!("23.10")));
    }

    #[test]
    fn test_consume_removes_value_and_tags_donor() {
        let proc = build(json!({"value-name": "os-version", "consume": true}));
        let out = proc.apply(vec![donor()]);
        assert!(!out[0].values.contains_key("os-version"));
        assert_eq!(out[0].tags.get("os-version"), Some(&"23.10".to_string()));
    }

    #[test]
    fn test_numeric_value_rendered_as_string() {
        let proc = build(json!({"value-name": "slot", "consume": true}));
        let mut ev = EventMsg::with_timestamp("sub1", 1);
        ev.add_value("slot", json!(3));
        let out = proc.apply(vec![ev]);
        assert_eq!(out[0].tags.get("slot"), Some(&"3".to_string()));
    }

    #[test]
    fn test_event_with_own_value_never_overwritten() {
        let proc = build(json!({"value-name": "os-version"}));

        // A tagless donor matches every event in the batch.
        let mut broad = EventMsg::with_timestamp("sub1", 1);
        broad.add_value("os-version", json!("generic"));

        let mut own = EventMsg::with_timestamp("sub1", 2);
        own.add_tag("source", "r1");
        own.add_value("os-version", json!("23.10"));

        let mut plain = EventMsg::with_timestamp("sub1", 3);
        plain.add_tag("source", "r2");

        let out = proc.apply(vec![broad, own, plain]);
        // Value holders are untouched; only the plain event is tagged,
        // by the broad donor (the r1 donor's tags do not cover it).
        assert!(!out[0].tags.contains_key("os-version"));
        assert!(!out[1].tags.contains_key("os-version"));
        assert_eq!(out[2].tags.get("os-version"), Some(&"generic".to_string()));
    }

    #[test]
    fn test_batch_without_donor_unchanged() {
        let proc = build(json!({"value-name": "os-version"}));
        let mut ev = EventMsg::with_timestamp("sub1", 1);
        ev.add_tag("source", "r1");
        let out = proc.apply(vec![ev.clone()]);
        assert_eq!(out, vec![ev]);
    }
}
