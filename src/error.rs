use thiserror::Error;

use crate::formula::FormulaError;

/// Problems with the run parameters. Always raised before a run starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("invalid custom formula: {0}")]
    Formula(#[from] FormulaError),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::Invalid(msg.into())
    }
}

/// Errors surfaced while running a simulation or writing its output.
#[derive(Debug, Error)]
pub enum SimError {
    /// The engine tried to serve or remove from an empty queue.
    #[error("queue is empty")]
    EmptyQueue,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("csv output failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracing init failed: {0}")]
    Tracing(String),
}
