//! Scripted planners for unit tests.

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::agents::StopHandle;
use crate::config::Config;
use crate::planner::{
    ActionDecision, ActionRequest, AgentPlanner, DelegationDecision, DelegationRequest,
    PlannerError, WorkerPlanner,
};

/// Config with small timeouts and two transport retries.
pub(crate) fn fast_config() -> Config {
    let mut config = Config::new("test-key");
    config.request_timeout = Duration::from_secs(1);
    config.max_retries = 2;
    config.retry_delay = Duration::from_millis(1);
    config
}

/// Replays a fixed list of replies, then a fallback, recording every request.
pub(crate) struct Script<Req, Resp> {
    replies: Mutex<VecDeque<Result<Resp, PlannerError>>>,
    fallback: Option<Result<Resp, PlannerError>>,
    requests: Mutex<Vec<Req>>,
}

impl<Req: Clone, Resp: Clone> Script<Req, Resp> {
    fn scripted(
        replies: Vec<Result<Resp, PlannerError>>,
        fallback: Option<Result<Resp, PlannerError>>,
    ) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    async fn next(&self, request: &Req, exhausted: Resp) -> Result<Resp, PlannerError> {
        self.requests.lock().await.push(request.clone());
        match self.replies.lock().await.pop_front() {
            Some(reply) => reply,
            None => self.fallback.clone().unwrap_or(Ok(exhausted)),
        }
    }

    pub(crate) async fn requests(&self) -> Vec<Req> {
        self.requests.lock().await.clone()
    }
}

pub(crate) type ScriptedWorkerPlanner = Script<ActionRequest, ActionDecision>;
pub(crate) type ScriptedAgentPlanner = Script<DelegationRequest, DelegationDecision>;

impl ScriptedWorkerPlanner {
    /// Reply with `replies` in order, then `Done`.
    pub(crate) fn new(replies: Vec<Result<ActionDecision, PlannerError>>) -> Self {
        Self::scripted(replies, None)
    }

    /// Reply with `decision` forever.
    pub(crate) fn repeating(decision: ActionDecision) -> Self {
        Self::scripted(Vec::new(), Some(Ok(decision)))
    }

    /// Fail every call with `error`.
    pub(crate) fn repeating_error(error: PlannerError) -> Self {
        Self::scripted(Vec::new(), Some(Err(error)))
    }
}

impl ScriptedAgentPlanner {
    /// Reply with `replies` in order, then `Done`.
    pub(crate) fn new(replies: Vec<Result<DelegationDecision, PlannerError>>) -> Self {
        Self::scripted(replies, None)
    }

    /// Reply with `decision` forever.
    pub(crate) fn repeating(decision: DelegationDecision) -> Self {
        Self::scripted(Vec::new(), Some(Ok(decision)))
    }

    /// Fail every call with `error`.
    pub(crate) fn repeating_error(error: PlannerError) -> Self {
        Self::scripted(Vec::new(), Some(Err(error)))
    }
}

#[async_trait]
impl WorkerPlanner for ScriptedWorkerPlanner {
    async fn next_action(&self, request: &ActionRequest) -> Result<ActionDecision, PlannerError> {
        self.next(request, ActionDecision::done("script exhausted")).await
    }
}

#[async_trait]
impl AgentPlanner for ScriptedAgentPlanner {
    async fn next_delegation(
        &self,
        request: &DelegationRequest,
    ) -> Result<DelegationDecision, PlannerError> {
        self.next(request, DelegationDecision::done("script exhausted")).await
    }
}

/// Wraps a planner and requests a stop right after every decision, before
/// the caller can act on it.
pub(crate) struct StopAfterDecision<P> {
    inner: P,
    stop: OnceLock<StopHandle>,
}

impl<P> StopAfterDecision<P> {
    pub(crate) fn new(inner: P) -> Self {
        Self {
            inner,
            stop: OnceLock::new(),
        }
    }

    /// Handle to stop once a decision has been made.
    pub(crate) fn arm(&self, stop: StopHandle) {
        let _ = self.stop.set(stop);
    }

    fn fire(&self) {
        if let Some(stop) = self.stop.get() {
            stop.stop();
        }
    }
}

#[async_trait]
impl<P: WorkerPlanner> WorkerPlanner for StopAfterDecision<P> {
    async fn next_action(&self, request: &ActionRequest) -> Result<ActionDecision, PlannerError> {
        let decision = self.inner.next_action(request).await;
        self.fire();
        decision
    }
}

#[async_trait]
impl<P: AgentPlanner> AgentPlanner for StopAfterDecision<P> {
    async fn next_delegation(
        &self,
        request: &DelegationRequest,
    ) -> Result<DelegationDecision, PlannerError> {
        let decision = self.inner.next_delegation(request).await;
        self.fire();
        decision
    }
}
