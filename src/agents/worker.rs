//! Worker: the low-level planner loop.
//!
//! # Algorithm
//! 1. Ask the planner which function to call, given description, instruction,
//!    state, recent history and the task
//! 2. Execute the function locally
//! 3. Record the step and fold the result into worker state
//! 4. Repeat until the planner says done/failed or the step limit is hit
//!
//! Only the planner call is retried. A failed function is data for the next
//! decision, never a reason to call it again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use super::context::StopHandle;
use super::types::{Outcome, TerminalReason, WorkerOutcome, WorkerPhase};
use crate::config::Config;
use crate::error::Result;
use crate::function::{ActionSpace, Function, FunctionResult};
use crate::planner::{
    with_retry, ActionDecision, ActionRequest, RetryConfig, TransportError, WorkerDescriptor,
    WorkerPlanner,
};
use crate::session::{Session, WorkerStep};
use crate::state::{Reducer, State, StateManager};
use crate::task::Task;

/// Static definition of a worker.
#[derive(Clone)]
pub struct WorkerConfig {
    id: String,
    description: String,
    instruction: Option<String>,
    reducer: Arc<dyn Reducer<FunctionResult>>,
    action_space: ActionSpace,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("instruction", &self.instruction)
            .field("action_space", &self.action_space)
            .finish_non_exhaustive()
    }
}

impl WorkerConfig {
    /// Define a worker.
    ///
    /// # Errors
    /// [`Error::DuplicateFunction`](crate::Error::DuplicateFunction) if two
    /// functions share a name.
    pub fn new<R>(
        id: impl Into<String>,
        description: impl Into<String>,
        reducer: R,
        functions: Vec<Function>,
    ) -> Result<Self>
    where
        R: Reducer<FunctionResult> + 'static,
    {
        Ok(Self {
            id: id.into(),
            description: description.into(),
            instruction: None,
            reducer: Arc::new(reducer),
            action_space: ActionSpace::from_functions(functions)?,
        })
    }

    /// Standing instruction sent with every decision request.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    pub fn descriptor(&self) -> WorkerDescriptor {
        WorkerDescriptor {
            id: self.id.clone(),
            description: self.description.clone(),
            functions: self.action_space.names(),
        }
    }
}

/// Limits and timeouts for one worker, taken from [`Config`].
#[derive(Debug, Clone)]
struct WorkerLimits {
    max_steps: usize,
    history_window: usize,
    request_timeout: Duration,
    function_timeout: Option<Duration>,
    retry: RetryConfig,
}

impl WorkerLimits {
    fn from_config(config: &Config) -> Self {
        Self {
            max_steps: config.worker_max_steps,
            history_window: config.history_window,
            request_timeout: config.request_timeout,
            function_timeout: config.function_timeout,
            retry: config.retry_config(),
        }
    }
}

/// A running worker: configuration plus its own state, session and phase.
///
/// Exactly one function executes at a time (`run` takes `&mut self`).
pub struct Worker {
    config: WorkerConfig,
    planner: Arc<dyn WorkerPlanner>,
    limits: WorkerLimits,
    state: StateManager<FunctionResult>,
    session: Session<WorkerStep>,
    phase: WorkerPhase,
    stop: StopHandle,
}

impl Worker {
    /// Create a worker and compute its initial state.
    ///
    /// # Errors
    /// [`Error::State`](crate::Error::State) if the reducer rejects the
    /// initial input, or a config error if limits are invalid.
    pub fn new(
        config: WorkerConfig,
        planner: Arc<dyn WorkerPlanner>,
        settings: &Config,
    ) -> Result<Self> {
        Self::with_stop_handle(config, planner, settings, StopHandle::new())
    }

    pub(crate) fn with_stop_handle(
        config: WorkerConfig,
        planner: Arc<dyn WorkerPlanner>,
        settings: &Config,
        stop: StopHandle,
    ) -> Result<Self> {
        settings.validate()?;
        let state = StateManager::new(config.id.clone(), Arc::clone(&config.reducer))?;
        Ok(Self {
            config,
            planner,
            limits: WorkerLimits::from_config(settings),
            state,
            session: Session::new(),
            phase: WorkerPhase::Idle,
            stop,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> &State {
        self.state.current()
    }

    pub fn session(&self) -> &Session<WorkerStep> {
        &self.session
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub(crate) fn set_stop_handle(&mut self, stop: StopHandle) {
        self.stop = stop;
    }

    /// Start over: initial state, empty session under a new id.
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()?;
        self.session.reset();
        self.phase = WorkerPhase::Idle;
        Ok(())
    }

    /// Pursue `task` until the planner finishes it or a limit is hit.
    ///
    /// # Errors
    /// Only hard faults (a failing reducer) are returned as `Err`. Transport
    /// exhaustion, protocol violations and the step limit end the run with a
    /// failed [`Outcome`].
    pub async fn run(&mut self, task: Task) -> Result<WorkerOutcome> {
        tracing::info!("Worker {} starting task: {}", self.config.id, task);
        let mut last_result: Option<FunctionResult> = None;

        for step in 0..self.limits.max_steps {
            if self.stop.is_stopped() {
                return Ok(self.stopped(step, &last_result));
            }

            self.phase = WorkerPhase::AwaitingDecision;
            tracing::debug!("Worker {} step {}", self.config.id, step + 1);

            let request = self.build_request(&task, step);
            let decision = match self.decide(&request).await {
                Ok(decision) => decision,
                Err(e) => return Ok(self.fail(Outcome::transport(&e), step, &last_result)),
            };

            let (fn_id, name, arguments, reasoning) = match decision {
                ActionDecision::Done { message } => {
                    self.phase = WorkerPhase::Terminated;
                    tracing::info!("Worker {} finished after {} steps", self.config.id, step);
                    return Ok(with_last_result(
                        Outcome::done(message).with_steps(step),
                        &last_result,
                    ));
                }
                ActionDecision::Failed { reason } => {
                    tracing::info!("Worker {} gave up: {}", self.config.id, reason);
                    let outcome = Outcome::failed(reason, TerminalReason::PlannerFailed);
                    return Ok(self.fail(outcome, step, &last_result));
                }
                ActionDecision::Call {
                    fn_id,
                    name,
                    arguments,
                    reasoning,
                } => (fn_id, name, arguments, reasoning),
            };

            let Some(function) = self.config.action_space.get(&name).cloned() else {
                tracing::warn!(
                    "Worker {}: planner chose unknown function '{}'",
                    self.config.id,
                    name
                );
                let outcome = Outcome::failed(
                    format!("unknown function '{}'", name),
                    TerminalReason::Protocol,
                )
                .with_info("function", Value::String(name));
                return Ok(self.fail(outcome, step, &last_result));
            };

            if self.stop.is_stopped() {
                return Ok(self.stopped(step, &last_result));
            }

            if let Some(reasoning) = &reasoning {
                tracing::debug!("Worker {} reasoning: {}", self.config.id, reasoning);
            }

            self.phase = WorkerPhase::Executing;
            let result = function
                .execute_call(fn_id, arguments.clone(), self.limits.function_timeout)
                .await;
            tracing::debug!(
                "Worker {} called {} -> {}: {}",
                self.config.id,
                name,
                result.status(),
                result.message()
            );

            self.session.append(WorkerStep {
                task: task.text.clone(),
                function: name,
                arguments,
                result: result.clone(),
                reasoning,
                timestamp: Utc::now(),
            });

            if let Err(e) = self.state.update(&result) {
                self.phase = WorkerPhase::Failed;
                return Err(e);
            }
            last_result = Some(result);
            self.phase = WorkerPhase::Idle;
        }

        tracing::warn!(
            "Worker {} hit step limit ({})",
            self.config.id,
            self.limits.max_steps
        );
        let outcome = Outcome::failed("step limit exceeded", TerminalReason::StepLimit);
        Ok(self.fail(outcome, self.limits.max_steps, &last_result))
    }

    async fn decide(
        &self,
        request: &ActionRequest,
    ) -> std::result::Result<ActionDecision, TransportError> {
        let planner = &self.planner;
        let operation = format!("Worker {} planner call", self.config.id);
        with_retry(
            &self.limits.retry,
            self.limits.request_timeout,
            &operation,
            move || planner.next_action(request),
        )
        .await
    }

    fn build_request(&self, task: &Task, step: usize) -> ActionRequest {
        ActionRequest {
            worker_id: self.config.id.clone(),
            description: self.config.description.clone(),
            instruction: self.config.instruction.clone(),
            state: self.state.current().clone(),
            history: self.session.recent(self.limits.history_window).to_vec(),
            functions: self.config.action_space.descriptors(),
            task: task.clone(),
            step,
        }
    }

    fn fail(&mut self, outcome: Outcome, steps: usize, last: &Option<FunctionResult>) -> Outcome {
        self.phase = WorkerPhase::Failed;
        with_last_result(outcome.with_steps(steps), last)
    }

    fn stopped(&mut self, steps: usize, last: &Option<FunctionResult>) -> Outcome {
        tracing::info!("Worker {} stopped after {} steps", self.config.id, steps);
        self.phase = WorkerPhase::Terminated;
        with_last_result(Outcome::stopped().with_steps(steps), last)
    }
}

/// Attach the most recent function result as `info.last_result`.
fn with_last_result(outcome: Outcome, last: &Option<FunctionResult>) -> Outcome {
    match last.as_ref().map(serde_json::to_value) {
        Some(Ok(value)) => outcome.with_info("last_result", value),
        _ => outcome,
    }
}
