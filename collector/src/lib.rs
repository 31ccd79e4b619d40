//! VIRTA collector - streaming telemetry pipeline
//!
//! Collects telemetry updates from many independent sources, normalizes
//! them into [`EventMsg`] records, runs them through a configurable
//! processor chain and fans them out to independently-failing outputs.
//! Pull-based consumers are served from a TTL-bounded read-through cache
//! instead of the push stream.
//!
//! # Pipeline
//!
//! ```text
//! Inputs (N workers each) ──► Processor Chain ──► Outputs (fan-out)
//!                                            └──► TTL Cache ──► pull outputs
//! ```
//!
//! All four plugin families (inputs, outputs, processors, actions) are
//! pluggable via traits and instantiated by type name through
//! dependency-injected registries. Configuration is supplied as open
//! string-keyed maps and decoded into each plugin's typed config.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod actions;
pub mod cache;
pub mod cluster;
pub mod error;
pub mod inputs;
pub mod outputs;
pub mod processors;
pub mod subscribe;

pub use cache::{CacheConfig, TtlCache};
pub use cluster::{lock_key, Clustering, Locker, NoopLocker};
pub use error::{Error, Result};
pub use subscribe::{shutdown_with_timeout, subscribe_once, SubscribeOpts};
pub use virta_core::{
    decode_config, decode_event_batch, encode_event_batch, EventMsg, PluginConfig, PluginError,
    TargetConfig,
};
