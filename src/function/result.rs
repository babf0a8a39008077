//! Function results and the success/failure contract of capabilities.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome class of a single function invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionStatus {
    /// Capability completed successfully
    Done,
    /// Capability reported a recoverable failure
    Failed,
    /// Arguments were invalid or the capability broke unexpectedly
    Error,
}

impl std::fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Result of one function invocation.
///
/// Produced exactly once per invocation and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    action_id: String,
    function: String,
    status: FunctionStatus,
    message: String,
    #[serde(default)]
    info: Map<String, Value>,
}

/// `info` key set on results whose arguments failed validation.
pub const VALIDATION_ERROR_KEY: &str = "validation_error";
/// `info` key set on results whose capability faulted.
pub const INTERNAL_ERROR_KEY: &str = "internal_error";
/// `info` key set on results whose capability overran its timeout.
pub const TIMEOUT_KEY: &str = "timeout";

impl FunctionResult {
    pub(crate) fn new(
        action_id: String,
        function: String,
        status: FunctionStatus,
        message: String,
        info: Map<String, Value>,
    ) -> Self {
        Self {
            action_id,
            function,
            status,
            message,
            info,
        }
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Name of the function that produced this result.
    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn status(&self) -> FunctionStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }

    pub fn is_done(&self) -> bool {
        self.status == FunctionStatus::Done
    }

    /// Whether the arguments were rejected before the capability ran.
    pub fn is_validation_error(&self) -> bool {
        self.flag(VALIDATION_ERROR_KEY)
    }

    /// Whether the capability broke rather than reporting a failure.
    pub fn is_internal_error(&self) -> bool {
        self.flag(INTERNAL_ERROR_KEY)
    }

    fn flag(&self, key: &str) -> bool {
        self.info.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Successful output of a capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionOutput {
    pub message: String,
    pub info: Map<String, Value>,
}

impl FunctionOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            info: Map::new(),
        }
    }

    /// Add one structured info entry.
    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    /// Replace the structured info.
    pub fn with_info_map(mut self, info: Map<String, Value>) -> Self {
        self.info = info;
        self
    }
}

/// How a capability signals that it did not succeed.
///
/// The variant decides the resulting status: `Failed` becomes
/// [`FunctionStatus::Failed`], `Fault` becomes [`FunctionStatus::Error`].
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    /// Expected, recoverable failure (e.g. the external API refused)
    #[error("{message}")]
    Failed {
        message: String,
        info: Map<String, Value>,
    },

    /// Unexpected internal error
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl CapabilityError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            info: Map::new(),
        }
    }

    pub fn failed_with_info(message: impl Into<String>, info: Map<String, Value>) -> Self {
        Self::Failed {
            message: message.into(),
            info,
        }
    }
}
