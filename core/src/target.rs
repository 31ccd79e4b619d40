//! Collection target configuration
//!
//! A target is one externally-managed telemetry source being collected
//! from. Plugins receive a read-only snapshot of the currently known
//! target configurations through their `with_targets` hooks; they never
//! own or mutate target state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration snapshot for one collection target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Target name, unique across the collector
    pub name: String,

    /// Dial address, host:port
    pub address: String,

    /// Subscription names this target is collected under
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<String>,

    /// Static tags merged into every event from this target
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub event_tags: HashMap<String, String>,
}

impl TargetConfig {
    /// Create a target with a name and address
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_target_decode() {
        let cfg: TargetConfig = serde_json::from_str(
            r#"{"name": "r1", "address": "10.0.0.1:57400", "event-tags": {"region": "west"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.name, "r1");
        assert_eq!(cfg.address, "10.0.0.1:57400");
        assert_eq!(cfg.event_tags.get("region"), Some(&"west".to_string()));
    }
}
