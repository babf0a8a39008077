//! # game-sdk
//!
//! Local execution engine for agents driven by a remote planner.
//!
//! This library provides:
//! - Typed, validated functions wrapping arbitrary capabilities
//! - Workers that loop planner decision → function call → state update
//! - Agents that delegate tasks to workers toward a goal
//! - A retrying HTTP client for the hosted planner service
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │              Agent               │
//!        │  (goal, state, delegation loop)  │
//!        └────────────────┬─────────────────┘
//!                         │ task
//!                         ▼
//!        ┌──────────────────────────────────┐
//!        │              Worker              │
//!        │  (action space, state, history)  │
//!        └────────────────┬─────────────────┘
//!                         │ arguments
//!                         ▼
//!                ┌─────────────────┐
//!                │    Function     │
//!                │  (capability)   │
//!                └─────────────────┘
//! ```
//!
//! Both loops consult a planner ([`AgentPlanner`], [`WorkerPlanner`]) for
//! every decision. Planner calls are the only thing retried.
//!
//! ## Modules
//! - `agents`: Agent and Worker loops, outcomes, stop handles
//! - `function`: Function schema, validation and capability adapters
//! - `planner`: planner traits, wire types, retry, HTTP client
//! - `state`: reducer-driven state management
//! - `session`: append-only history

pub mod agents;
pub mod config;
pub mod error;
pub mod function;
pub mod planner;
pub mod session;
pub mod state;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use agents::{
    Agent, AgentConfig, AgentOutcome, FailurePolicy, Outcome, OutcomeStatus, StopHandle,
    TerminalReason, Worker, WorkerConfig, WorkerOutcome,
};
pub use config::Config;
pub use error::{Error, Result};
pub use function::{
    ActionSpace, ArgType, Argument, Arguments, Capability, CapabilityError, Function,
    FunctionOutput, FunctionResult, FunctionStatus,
};
pub use planner::{AgentPlanner, HttpPlanner, PlannerError, WorkerPlanner};
pub use session::Session;
pub use state::{Reducer, State, StateManager};
pub use task::Task;
