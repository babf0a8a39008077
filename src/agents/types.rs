//! Core types for the agent system.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::planner::TransportError;

/// How a worker run or agent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Done,
    Failed,
    /// Stopped through a [`StopHandle`](super::StopHandle)
    Stopped,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Reason why execution terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Planner signalled completion
    Completed,
    /// Planner signalled failure
    PlannerFailed,
    /// Planner named a function or worker that does not exist
    Protocol,
    /// Hit the step limit
    StepLimit,
    /// Planner could not be reached after all retries
    Transport,
    /// Stopped by the caller
    Cancelled,
    /// A worker failed and the failure policy escalated it
    WorkerFailed,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Completed => "completed",
            Self::PlannerFailed => "planner reported failure",
            Self::Protocol => "protocol error",
            Self::StepLimit => "step limit exceeded",
            Self::Transport => "planner unreachable",
            Self::Cancelled => "cancelled",
            Self::WorkerFailed => "worker failed",
        };
        f.write_str(text)
    }
}

/// Result of a worker run or an agent run.
///
/// # Invariants
/// - `status == Done` iff `terminal_reason == Completed`
/// - `status == Stopped` iff `terminal_reason == Cancelled`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,

    /// Planner message on completion, or what went wrong
    pub message: String,

    pub terminal_reason: TerminalReason,

    /// Function calls (worker) or delegations (agent) performed
    pub steps: usize,

    /// Accumulated details, e.g. the last function result
    #[serde(default)]
    pub info: Map<String, Value>,
}

/// Outcome of [`Worker::run`](super::Worker::run).
pub type WorkerOutcome = Outcome;

/// Outcome of [`Agent::run`](super::Agent::run).
pub type AgentOutcome = Outcome;

impl Outcome {
    /// Create a successful outcome.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Done,
            message: message.into(),
            terminal_reason: TerminalReason::Completed,
            steps: 0,
            info: Map::new(),
        }
    }

    /// Create a failure outcome.
    pub fn failed(message: impl Into<String>, reason: TerminalReason) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            message: message.into(),
            terminal_reason: reason,
            steps: 0,
            info: Map::new(),
        }
    }

    /// Create a failure outcome for a planner that could not be reached.
    ///
    /// `info` carries `attempts`, `kind` and, for HTTP failures, `status_code`.
    pub fn transport(error: &TransportError) -> Self {
        let mut outcome = Self::failed(error.to_string(), TerminalReason::Transport)
            .with_info("attempts", json!(error.attempts))
            .with_info("kind", json!(error.last_error.kind.as_str()));
        if let Some(code) = error.last_error.status_code {
            outcome = outcome.with_info("status_code", json!(code));
        }
        outcome
    }

    /// Create an outcome for a run stopped by the caller.
    pub fn stopped() -> Self {
        Self {
            status: OutcomeStatus::Stopped,
            message: "stopped by caller".to_string(),
            terminal_reason: TerminalReason::Cancelled,
            steps: 0,
            info: Map::new(),
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: Value) -> Self {
        self.info.insert(key.into(), value);
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == OutcomeStatus::Done
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    AwaitingDecision,
    Executing,
    Terminated,
    Failed,
}

/// Agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Idle,
    AwaitingDelegation,
    Delegating,
    Terminated,
    Failed,
}

impl AgentPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

/// What an agent does when a delegated worker run fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure in agent state and let the planner decide
    #[default]
    Report,
    /// Fail the agent run immediately
    Escalate,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "report" => Ok(Self::Report),
            "escalate" => Ok(Self::Escalate),
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors_pair_status_and_reason() {
        let done = Outcome::done("ok").with_steps(2);
        assert!(done.is_done());
        assert_eq!(done.terminal_reason, TerminalReason::Completed);
        assert_eq!(done.steps, 2);

        let failed = Outcome::failed("no such function", TerminalReason::Protocol);
        assert!(failed.is_failed());

        let stopped = Outcome::stopped();
        assert_eq!(stopped.terminal_reason, TerminalReason::Cancelled);
    }

    #[test]
    fn test_transport_outcome_keeps_retry_details() {
        let error = TransportError {
            attempts: 3,
            last_error: crate::planner::PlannerError::server_error(503, "unavailable".to_string()),
        };

        let outcome = Outcome::transport(&error);
        assert_eq!(outcome.terminal_reason, TerminalReason::Transport);
        assert_eq!(outcome.info.get("attempts"), Some(&json!(3)));
        assert_eq!(outcome.info.get("kind"), Some(&json!("server_error")));
        assert_eq!(outcome.info.get("status_code"), Some(&json!(503)));

        let network = TransportError {
            attempts: 1,
            last_error: crate::planner::PlannerError::network_error("reset".to_string()),
        };
        assert!(!Outcome::transport(&network).info.contains_key("status_code"));
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("Escalate".parse::<FailurePolicy>(), Ok(FailurePolicy::Escalate));
        assert_eq!(" report ".parse::<FailurePolicy>(), Ok(FailurePolicy::Report));
        assert!("ignore".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::Report);
    }
}
