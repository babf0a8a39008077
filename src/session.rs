//! Append-only interaction history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agents::Outcome;
use crate::function::{Arguments, FunctionResult};
use crate::task::Task;

/// Ordered history of one agent or worker.
///
/// Entries are only ever appended. [`Session::reset`] starts a new session
/// under a fresh id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<T> {
    id: Uuid,
    started_at: DateTime<Utc>,
    entries: Vec<T>,
}

impl<T> Session<T> {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn append(&mut self, entry: T) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[T] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn last(&self) -> Option<&T> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all history and take a new id.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl<T> Default for Session<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One function call made by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStep {
    pub task: String,
    pub function: String,
    pub arguments: Arguments,
    pub result: FunctionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One delegation made by an agent, and how it ended.
///
/// This is also the event folded into agent state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub worker_id: String,
    pub task: Task,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub timestamp: DateTime<Utc>,
}
