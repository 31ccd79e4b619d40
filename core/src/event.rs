//! Canonical telemetry event record
//!
//! [`EventMsg`] is the normalized representation every input decodes into
//! and every output consumes. It is deliberately plain data: a name, a
//! source-reported timestamp, string tags identifying the measurement's
//! dimensions, scalar values carrying the payload, and an ordered list of
//! deleted paths for update+delete semantics.
//!
//! The structured wire format is a JSON array of events. [`decode_event_batch`]
//! also accepts a single object for convenience; [`encode_event_batch`]
//! always produces an array.

use crate::error::PluginError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One observed telemetry sample
///
/// `tags` and `values` are always allocated maps, so processors can read
/// them without nil checks. Keys are unique; order is irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventMsg {
    /// Logical subscription or measurement name
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Sample time in nanoseconds, source-reported preferred over local clock
    #[serde(skip_serializing_if = "is_zero")]
    pub timestamp: i64,

    /// Measurement dimensions: target, path components, keys
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Measurement payload: string, number or bool scalars
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub values: HashMap<String, Value>,

    /// Ordered list of tag/value paths removed since the last sample
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl EventMsg {
    /// Create an event with the given name and the current local time
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
            ..Self::default()
        }
    }

    /// Create an event with an explicit source-reported timestamp
    pub fn with_timestamp(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            ..Self::default()
        }
    }

    /// Insert a tag, replacing any existing value under the same key
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// Insert a value, replacing any existing value under the same key
    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }
}

/// Render a scalar value the way it appears in a tag
///
/// Strings render without surrounding quotes; numbers and bools use their
/// canonical display form. Non-scalar values fall back to compact JSON.
pub fn scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode a structured-event payload into a batch
///
/// Accepts a JSON array of events or a single event object.
pub fn decode_event_batch(data: &[u8]) -> Result<Vec<EventMsg>, PluginError> {
    let value: Value =
        serde_json::from_slice(data).map_err(|e| PluginError::Decode(e.to_string()))?;
    match value {
        Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| PluginError::Decode(e.to_string()))
        }
        Value::Object(_) => {
            let ev: EventMsg =
                serde_json::from_value(value).map_err(|e| PluginError::Decode(e.to_string()))?;
            Ok(vec![ev])
        }
        other => Err(PluginError::Decode(format!(
            "expected event object or array, got {other}"
        ))),
    }
}

/// Encode a batch of events as the structured wire format (JSON array)
pub fn encode_event_batch(events: &[EventMsg]) -> Result<Vec<u8>, PluginError> {
    serde_json::to_vec(events).map_err(|e| PluginError::Decode(e.to_string()))
}
