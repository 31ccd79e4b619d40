//! Error types for VIRTA plugins

use thiserror::Error;

/// Error type for plugin operations
///
/// This is the standard error type used by all VIRTA plugins including
/// inputs, outputs, processors and actions. Each variant maps to one
/// failure class with its own propagation policy:
///
/// - [`Config`](PluginError::Config) is fatal at init time and aborts
///   startup of that one plugin instance only.
/// - [`Connection`](PluginError::Connection) is transient; input workers
///   retry indefinitely with a fixed backoff and never surface it to the
///   pipeline.
/// - [`Decode`](PluginError::Decode) drops the offending message; the
///   pipeline continues.
/// - [`Expression`](PluginError::Expression) is treated as "no match" by
///   processors; it never aborts a batch.
/// - [`Write`](PluginError::Write) is logged by the failing output and
///   must not block or crash sibling outputs.
/// - [`Process`](PluginError::Process) carries a subprocess' captured
///   stderr back to the action caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Invalid configuration
    ///
    /// Returned when a plugin fails to initialize from its config map.
    /// Examples: unknown type name, malformed regex, missing required field.
    #[error("configuration error: {0}")]
    Config(String),

    /// Session or connection failure
    ///
    /// Returned when a consumer session or network connection fails.
    /// Examples: broker unreachable, session lost, rebalance error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed payload
    ///
    /// Returned when raw bytes cannot be decoded into events.
    /// The message is dropped and logged; the worker keeps consuming.
    #[error("decode error: {0}")]
    Decode(String),

    /// Condition or regex evaluation failure
    ///
    /// Treated as a non-match by processors, never as a batch failure.
    #[error("expression error: {0}")]
    Expression(String),

    /// Downstream write failure
    ///
    /// Returned when an output fails to deliver. The fan-out logs it and
    /// continues with the remaining outputs.
    #[error("write error: {0}")]
    Write(String),

    /// Subprocess exited with a non-zero status
    ///
    /// Carries the captured stderr so action callers can surface it.
    #[error("process exited with status {status}: {stderr}")]
    Process {
        /// Exit status of the child process (-1 when unavailable)
        status: i32,
        /// Captured stderr output
        stderr: String,
    },
}
