//! Agents module - the hierarchical planner loops.
//!
//! # Types
//! - **Agent**: high-level planner; asks the remote planner which worker acts
//!   next and on what task, then folds the worker's outcome into its state
//! - **Worker**: low-level planner; asks the remote planner which function to
//!   call next, executes it and folds the result into its state
//!
//! # Invariants
//! - Agent → Worker → Function runs strictly sequentially
//! - A worker's state is never read by another worker; workers communicate
//!   only through the owning agent's state
//! - Both loops are bounded by independent step limits

mod agent;
mod context;
mod types;
mod worker;

pub use agent::{Agent, AgentConfig};
pub use context::StopHandle;
pub use types::{
    AgentOutcome, AgentPhase, FailurePolicy, Outcome, OutcomeStatus, TerminalReason,
    WorkerOutcome, WorkerPhase,
};
pub use worker::{Worker, WorkerConfig};
