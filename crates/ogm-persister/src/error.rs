//! Configuration errors for ogm-persister.
//!
//! Everything else the persisters raise is an [`OgmError`]; only loading a
//! configuration has failure modes of its own.

use ogm_core::OgmError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON for [`crate::OgmConfig`].
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment variable holds a value that cannot be used.
    #[error("invalid value '{value}' for {variable}: {reason}")]
    InvalidVariable {
        variable: String,
        value: String,
        reason: String,
    },
}

impl From<ConfigError> for OgmError {
    fn from(err: ConfigError) -> Self {
        OgmError::backend(err)
    }
}
