//! Error types for the VIRTA collector

use thiserror::Error;
use virta_core::PluginError;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the VIRTA collector
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Plugin error
    #[error("plugin '{plugin}' error: {message}")]
    Plugin {
        /// Name of the failing plugin instance
        plugin: String,
        /// Failure description
        message: String,
    },

    /// One or more per-target subscriptions failed in a batch run
    #[error("{failed} of {total} target subscriptions failed")]
    SubscribeRun {
        /// Number of targets whose task returned an error
        failed: usize,
        /// Number of targets attempted
        total: usize,
    },

    /// Shutdown exceeded its deadline
    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PluginError> for Error {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Config(msg) => Error::Config(msg),
            other => Error::Plugin {
                plugin: "unknown".to_string(),
                message: other.to_string(),
            },
        }
    }
}
