//! Remote planner interface.
//!
//! The planner is a black box that chooses the next action. Workers ask it
//! which function to call; agents ask it which worker to delegate to. Only the
//! request/response contract lives here, along with the transport retry
//! discipline and an HTTP client for the hosted service.

mod error;
mod http;
mod retry;

pub use error::{classify_http_status, PlannerError, PlannerErrorKind, RetryConfig};
pub use http::HttpPlanner;
pub use retry::{with_retry, TransportError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::function::{Arguments, FunctionDescriptor};
use crate::session::{DelegationRecord, WorkerStep};
use crate::state::State;
use crate::task::Task;

/// Everything a worker tells the planner before each step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub worker_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    pub state: State,
    pub history: Vec<WorkerStep>,
    pub functions: Vec<FunctionDescriptor>,
    pub task: Task,
    /// Zero-based index of this step within the current run
    pub step: usize,
}

/// The planner's choice for a worker step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ActionDecision {
    /// Invoke a function
    #[serde(rename = "continue")]
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fn_id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Arguments,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// The task is complete
    Done {
        #[serde(default)]
        message: String,
    },
    /// The task cannot be completed
    Failed {
        #[serde(default)]
        reason: String,
    },
}

impl ActionDecision {
    /// Shorthand for a call without an id or reasoning.
    pub fn call(name: impl Into<String>, arguments: Arguments) -> Self {
        Self::Call {
            fn_id: None,
            name: name.into(),
            arguments,
            reasoning: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::Done {
            message: message.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// What the planner sees of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: String,
    pub description: String,
    pub functions: Vec<String>,
}

/// Everything an agent tells the planner before each delegation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub agent: String,
    pub goal: String,
    pub description: String,
    pub state: State,
    pub workers: Vec<WorkerDescriptor>,
    pub history: Vec<DelegationRecord>,
    pub step: usize,
}

/// The planner's choice for an agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DelegationDecision {
    /// Hand a task to a worker
    Delegate {
        worker_id: String,
        task: Task,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    /// The goal is reached
    Done {
        #[serde(default)]
        message: String,
    },
    /// The goal cannot be reached
    Failed {
        #[serde(default)]
        reason: String,
    },
}

impl DelegationDecision {
    pub fn delegate(worker_id: impl Into<String>, task: impl Into<Task>) -> Self {
        Self::Delegate {
            worker_id: worker_id.into(),
            task: task.into(),
            reasoning: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::Done {
            message: message.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Chooses the next function call for a worker.
#[async_trait]
pub trait WorkerPlanner: Send + Sync {
    async fn next_action(&self, request: &ActionRequest) -> Result<ActionDecision, PlannerError>;
}

/// Chooses the next delegation for an agent.
#[async_trait]
pub trait AgentPlanner: Send + Sync {
    async fn next_delegation(
        &self,
        request: &DelegationRequest,
    ) -> Result<DelegationDecision, PlannerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_decision_wire_shape() {
        let decision: ActionDecision = serde_json::from_value(json!({
            "status": "continue",
            "fn_id": "a1",
            "name": "get_weather",
            "arguments": {"city": {"value": "NYC"}}
        }))
        .unwrap();
        assert!(matches!(
            decision,
            ActionDecision::Call { ref fn_id, ref name, .. }
                if fn_id.as_deref() == Some("a1") && name == "get_weather"
        ));

        let done: ActionDecision = serde_json::from_value(json!({"status": "done"})).unwrap();
        assert_eq!(done, ActionDecision::done(""));
    }

    #[test]
    fn test_delegation_decision_wire_shape() {
        let decision: DelegationDecision = serde_json::from_value(json!({
            "status": "delegate",
            "worker_id": "weather",
            "task": {"text": "check NYC"}
        }))
        .unwrap();
        assert_eq!(decision, DelegationDecision::delegate("weather", "check NYC"));

        let failed = serde_json::to_value(DelegationDecision::failed("stuck")).unwrap();
        assert_eq!(failed, json!({"status": "failed", "reason": "stuck"}));
    }
}
