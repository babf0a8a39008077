//! Agent: the high-level planner loop that delegates tasks to workers.
//!
//! # Algorithm
//! 1. Ask the planner which worker should act next and on what task
//! 2. Run that worker to completion
//! 3. Fold the delegation record into agent state and history
//! 4. Repeat until the planner says done/failed, the step limit is hit, or the
//!    agent is stopped
//!
//! A failed worker run is reported back to the planner as history. With
//! [`FailurePolicy::Escalate`] it fails the agent instead.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::context::StopHandle;
use super::types::{AgentOutcome, AgentPhase, FailurePolicy, Outcome, OutcomeStatus, TerminalReason};
use super::worker::{Worker, WorkerConfig};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::planner::{
    with_retry, AgentPlanner, DelegationDecision, DelegationRequest, TransportError,
    WorkerPlanner,
};
use crate::session::{DelegationRecord, Session};
use crate::state::{Reducer, State, StateManager};

/// Static definition of an agent.
#[derive(Clone)]
pub struct AgentConfig {
    name: String,
    goal: String,
    description: String,
    reducer: Arc<dyn Reducer<DelegationRecord>>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("name", &self.name)
            .field("goal", &self.goal)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl AgentConfig {
    pub fn new<R>(
        name: impl Into<String>,
        goal: impl Into<String>,
        description: impl Into<String>,
        reducer: R,
    ) -> Self
    where
        R: Reducer<DelegationRecord> + 'static,
    {
        Self {
            name: name.into(),
            goal: goal.into(),
            description: description.into(),
            reducer: Arc::new(reducer),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// A goal-driven coordinator owning a set of workers.
pub struct Agent {
    config: AgentConfig,
    planner: Arc<dyn AgentPlanner>,
    worker_planner: Arc<dyn WorkerPlanner>,
    settings: Config,
    workers: Vec<Worker>,
    state: StateManager<DelegationRecord>,
    session: Session<DelegationRecord>,
    phase: AgentPhase,
    steps: usize,
    outcome: Option<AgentOutcome>,
    stop: StopHandle,
}

impl Agent {
    /// Create an agent and compute its initial state.
    ///
    /// `worker_planner` serves every worker added through [`Agent::add_worker`].
    pub fn new(
        config: AgentConfig,
        planner: Arc<dyn AgentPlanner>,
        worker_planner: Arc<dyn WorkerPlanner>,
        settings: &Config,
    ) -> Result<Self> {
        settings.validate()?;
        let state = StateManager::new(config.name.clone(), Arc::clone(&config.reducer))?;
        Ok(Self {
            config,
            planner,
            worker_planner,
            settings: settings.clone(),
            workers: Vec::new(),
            state,
            session: Session::new(),
            phase: AgentPhase::Idle,
            steps: 0,
            outcome: None,
            stop: StopHandle::new(),
        })
    }

    /// Register a worker served by the agent's worker planner.
    ///
    /// # Errors
    /// [`Error::DuplicateWorker`] if the id is taken; [`Error::State`] if the
    /// worker's reducer rejects its initial input.
    pub fn add_worker(&mut self, config: WorkerConfig) -> Result<()> {
        let planner = Arc::clone(&self.worker_planner);
        self.add_worker_with_planner(config, planner)
    }

    /// Register a worker served by its own planner.
    pub fn add_worker_with_planner(
        &mut self,
        config: WorkerConfig,
        planner: Arc<dyn WorkerPlanner>,
    ) -> Result<()> {
        if self.worker(config.id()).is_some() {
            return Err(Error::DuplicateWorker(config.id().to_string()));
        }
        tracing::debug!("Agent {} registered worker {}", self.config.name, config.id());
        let worker = Worker::with_stop_handle(config, planner, &self.settings, self.stop.child())?;
        self.workers.push(worker);
        Ok(())
    }

    pub fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id() == id)
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn state(&self) -> &State {
        self.state.current()
    }

    pub fn session(&self) -> &Session<DelegationRecord> {
        &self.session
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    /// Handle that stops this agent and whichever worker it is running.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Start over: initial state for the agent and every worker, fresh
    /// sessions, and a new stop handle. Handles obtained earlier no longer
    /// affect this agent.
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()?;
        self.session.reset();
        self.stop = StopHandle::new();
        for worker in &mut self.workers {
            worker.reset()?;
            worker.set_stop_handle(self.stop.child());
        }
        self.phase = AgentPhase::Idle;
        self.steps = 0;
        self.outcome = None;
        Ok(())
    }

    /// Delegate until the planner signals completion or failure, the step
    /// limit is hit, or the agent is stopped.
    ///
    /// Calling `run` again after it returned starts a new run with a fresh
    /// step budget; state and history carry over.
    ///
    /// # Errors
    /// [`Error::NoWorkers`] if no worker is registered, or a hard fault from
    /// a reducer.
    pub async fn run(&mut self) -> Result<AgentOutcome> {
        if self.outcome.is_some() {
            self.outcome = None;
            self.steps = 0;
            self.phase = AgentPhase::Idle;
        }
        if self.workers.is_empty() {
            return Err(Error::NoWorkers(self.config.name.clone()));
        }
        tracing::info!(
            "Agent {} starting with {} workers: {}",
            self.config.name,
            self.workers.len(),
            self.config.goal
        );

        loop {
            if let Some(outcome) = self.step().await? {
                return Ok(outcome);
            }
        }
    }

    /// Perform exactly one delegation cycle.
    ///
    /// Returns `Some` once the run has ended; further calls keep returning
    /// the same outcome until [`Agent::run`] or [`Agent::reset`].
    pub async fn step(&mut self) -> Result<Option<AgentOutcome>> {
        if let Some(outcome) = &self.outcome {
            return Ok(Some(outcome.clone()));
        }
        if self.workers.is_empty() {
            return Err(Error::NoWorkers(self.config.name.clone()));
        }
        if self.stop.is_stopped() {
            return Ok(Some(self.finish(Outcome::stopped(), AgentPhase::Terminated)));
        }
        if self.steps >= self.settings.agent_max_steps {
            tracing::warn!(
                "Agent {} hit step limit ({})",
                self.config.name,
                self.settings.agent_max_steps
            );
            let outcome = Outcome::failed("step limit exceeded", TerminalReason::StepLimit);
            return Ok(Some(self.finish(outcome, AgentPhase::Failed)));
        }

        self.phase = AgentPhase::AwaitingDelegation;
        tracing::debug!("Agent {} step {}", self.config.name, self.steps + 1);

        let request = self.build_request();
        let decision = match self.decide(&request).await {
            Ok(decision) => decision,
            Err(e) => return Ok(Some(self.finish(Outcome::transport(&e), AgentPhase::Failed))),
        };

        let (worker_id, task, reasoning) = match decision {
            DelegationDecision::Done { message } => {
                return Ok(Some(self.finish(Outcome::done(message), AgentPhase::Terminated)));
            }
            DelegationDecision::Failed { reason } => {
                let outcome = Outcome::failed(reason, TerminalReason::PlannerFailed);
                return Ok(Some(self.finish(outcome, AgentPhase::Failed)));
            }
            DelegationDecision::Delegate {
                worker_id,
                task,
                reasoning,
            } => (worker_id, task, reasoning),
        };

        let Some(index) = self.workers.iter().position(|w| w.id() == worker_id) else {
            tracing::warn!(
                "Agent {}: planner chose unknown worker '{}'",
                self.config.name,
                worker_id
            );
            let outcome =
                Outcome::failed(format!("unknown worker '{}'", worker_id), TerminalReason::Protocol)
                    .with_info("worker_id", Value::String(worker_id));
            return Ok(Some(self.finish(outcome, AgentPhase::Failed)));
        };

        if self.stop.is_stopped() {
            return Ok(Some(self.finish(Outcome::stopped(), AgentPhase::Terminated)));
        }

        if let Some(reasoning) = &reasoning {
            tracing::debug!("Agent {} reasoning: {}", self.config.name, reasoning);
        }
        tracing::info!(
            "Agent {} delegating to {}: {}",
            self.config.name,
            worker_id,
            task
        );

        self.phase = AgentPhase::Delegating;
        let worker_outcome = match self.workers[index].run(task.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.phase = AgentPhase::Failed;
                return Err(e);
            }
        };
        self.steps += 1;
        tracing::info!(
            "Worker {} finished with {}: {}",
            worker_id,
            worker_outcome.status,
            worker_outcome.message
        );

        let record = DelegationRecord {
            worker_id: worker_id.clone(),
            task,
            outcome: worker_outcome.clone(),
            reasoning,
            timestamp: Utc::now(),
        };
        self.session.append(record.clone());
        if let Err(e) = self.state.update(&record) {
            self.phase = AgentPhase::Failed;
            return Err(e);
        }

        match worker_outcome.status {
            OutcomeStatus::Stopped => {
                return Ok(Some(self.finish(Outcome::stopped(), AgentPhase::Terminated)));
            }
            OutcomeStatus::Failed if self.settings.failure_policy == FailurePolicy::Escalate => {
                let outcome = Outcome::failed(
                    format!("worker '{}' failed: {}", worker_id, worker_outcome.message),
                    TerminalReason::WorkerFailed,
                )
                .with_info("worker_id", Value::String(worker_id));
                return Ok(Some(self.finish(outcome, AgentPhase::Failed)));
            }
            _ => {}
        }

        self.phase = AgentPhase::Idle;
        Ok(None)
    }

    async fn decide(
        &self,
        request: &DelegationRequest,
    ) -> std::result::Result<DelegationDecision, TransportError> {
        let planner = &self.planner;
        let operation = format!("Agent {} planner call", self.config.name);
        with_retry(
            &self.settings.retry_config(),
            self.settings.request_timeout,
            &operation,
            move || planner.next_delegation(request),
        )
        .await
    }

    fn build_request(&self) -> DelegationRequest {
        DelegationRequest {
            agent: self.config.name.clone(),
            goal: self.config.goal.clone(),
            description: self.config.description.clone(),
            state: self.state.current().clone(),
            workers: self.workers.iter().map(|w| w.config().descriptor()).collect(),
            history: self.session.recent(self.settings.history_window).to_vec(),
            step: self.steps,
        }
    }

    fn finish(&mut self, outcome: Outcome, phase: AgentPhase) -> AgentOutcome {
        let outcome = outcome.with_steps(self.steps);
        tracing::info!(
            "Agent {} finished after {} delegations: {} ({})",
            self.config.name,
            self.steps,
            outcome.status,
            outcome.terminal_reason
        );
        self.phase = phase;
        self.outcome = Some(outcome.clone());
        outcome
    }
}
