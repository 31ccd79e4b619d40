//! Plugin configuration decoding
//!
//! All plugin configs arrive as an open string-keyed map (the shape a
//! config file loader naturally produces) and are decoded into each
//! plugin's strongly-typed configuration struct.
//!
//! Duration fields in plugin configs use `humantime_serde`, so timeouts
//! and wait intervals accept human-readable strings:
//!
//! ```ignore
//! #[derive(Deserialize)]
//! #[serde(default, rename_all = "kebab-case")]
//! struct Config {
//!     #[serde(with = "humantime_serde")]
//!     recovery_wait_time: Duration, // accepts "2s", "250ms", ...
//! }
//! ```

use crate::error::PluginError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// An untyped plugin configuration map
pub type PluginConfig = serde_json::Map<String, Value>;

/// Decode an open config map into a plugin's typed configuration
///
/// # Errors
/// Returns [`PluginError::Config`] when the map does not match the target
/// struct (unknown fields, wrong types, unparseable durations).
pub fn decode_config<T: DeserializeOwned>(cfg: &PluginConfig) -> Result<T, PluginError> {
    serde_json::from_value(Value::Object(cfg.clone()))
        .map_err(|e| PluginError::Config(e.to_string()))
}

/// Split a `{type: config}` map into its single entry
///
/// Plugin instances are configured as a one-entry map from type name to
/// that type's config. An empty or multi-entry map is a config error.
pub fn single_entry(cfg: &PluginConfig) -> Result<(&str, PluginConfig), PluginError> {
    let mut entries = cfg.iter();
    let (type_name, value) = entries
        .next()
        .ok_or_else(|| PluginError::Config("empty plugin config".to_string()))?;
    if entries.next().is_some() {
        return Err(PluginError::Config(format!(
            "plugin config must have exactly one type entry, got {}",
            cfg.len()
        )));
    }
    match value {
        Value::Object(map) => Ok((type_name, map.clone())),
        Value::Null => Ok((type_name, PluginConfig::new())),
        other => Err(PluginError::Config(format!(
            "malformed config for type {type_name:?}, expected a map, got {other}"
        ))),
    }
}
