//! virta-core - Core types for the VIRTA telemetry pipeline
//!
//! This crate provides the foundational types shared between the VIRTA
//! collector and external plugins (inputs, outputs, processors, actions):
//!
//! - [`EventMsg`] - the canonical normalized telemetry record
//! - [`PluginError`] - error taxonomy for plugin operations
//! - [`decode_config`] - open-map to typed-struct config decoding
//! - [`TargetConfig`] - read-only snapshot of a collection target
//!
//! # Why this crate exists
//!
//! External plugins need to exchange `EventMsg` values and plugin errors
//! with the collector. Without `virta-core`, they would depend on
//! `virta-collector`, and the collector could never optionally depend on
//! a plugin crate without creating a cycle. Extracting the shared types
//! here breaks the cycle:
//!
//! ```text
//! virta-core ◄── virta-collector
//!     ▲
//!     └────────── third-party plugin crates
//! ```

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

/// Open-map plugin configuration decoding
pub mod config;
mod error;
/// The canonical telemetry event record
pub mod event;
/// Collection target configuration snapshot
pub mod target;

pub use config::{decode_config, single_entry, PluginConfig};
pub use error::PluginError;
pub use event::{decode_event_batch, encode_event_batch, scalar_to_string, EventMsg};
pub use target::TargetConfig;
