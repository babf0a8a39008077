//! Crate-level hard faults.
//!
//! Everything here stops the caller: misconfigured schemas, duplicate
//! registrations, reducer failures. Recoverable problems (function failures,
//! planner transport errors, protocol violations) are reported through
//! outcomes instead.

use crate::config::ConfigError;

/// Result alias for fallible crate operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid schema for function '{function}': {reason}")]
    InvalidSchema { function: String, reason: String },

    #[error("Function '{0}' is already registered in this action space")]
    DuplicateFunction(String),

    #[error("Worker '{0}' is already registered")]
    DuplicateWorker(String),

    #[error("Agent '{0}' has no workers")]
    NoWorkers(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The user-supplied reducer failed. Never retried.
    #[error("State reducer for '{owner}' failed: {source}")]
    State {
        owner: String,
        #[source]
        source: anyhow::Error,
    },
}
