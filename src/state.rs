//! State derivation for agents and workers.
//!
//! State is an opaque JSON mapping owned by exactly one agent or worker. It is
//! never edited in place: every event produces a fresh mapping through the
//! user-supplied [`Reducer`].

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// User-defined state mapping.
pub type State = Map<String, Value>;

/// Derives the next state from the previous one and the latest event.
///
/// Called once with `event = None` and an empty mapping to produce the
/// initial state. Any error is fatal to the owning run.
pub trait Reducer<E>: Send + Sync {
    fn reduce(&self, event: Option<&E>, previous: &State) -> anyhow::Result<State>;
}

impl<E, F> Reducer<E> for F
where
    F: Fn(Option<&E>, &State) -> anyhow::Result<State> + Send + Sync,
{
    fn reduce(&self, event: Option<&E>, previous: &State) -> anyhow::Result<State> {
        self(event, previous)
    }
}

/// Holds the current state of one owner and applies its reducer.
pub struct StateManager<E> {
    owner: String,
    reducer: Arc<dyn Reducer<E>>,
    current: State,
    version: u64,
}

impl<E> std::fmt::Debug for StateManager<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("owner", &self.owner)
            .field("current", &self.current)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl<E> StateManager<E> {
    /// Create a manager and compute the initial state.
    ///
    /// # Errors
    /// [`Error::State`] if the reducer rejects the empty initial input.
    pub fn new(owner: impl Into<String>, reducer: Arc<dyn Reducer<E>>) -> Result<Self> {
        let owner = owner.into();
        let current = initial_state(&owner, reducer.as_ref())?;
        Ok(Self {
            owner,
            reducer,
            current,
            version: 0,
        })
    }

    /// The state as of the most recent update.
    pub fn current(&self) -> &State {
        &self.current
    }

    /// Number of updates applied since construction or the last reset.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fold `event` into the state.
    ///
    /// On error the previous state is kept unchanged.
    pub fn update(&mut self, event: &E) -> Result<&State> {
        let next = self
            .reducer
            .reduce(Some(event), &self.current)
            .map_err(|source| {
                tracing::error!("State reducer for {} failed: {:#}", self.owner, source);
                Error::State {
                    owner: self.owner.clone(),
                    source,
                }
            })?;
        self.current = next;
        self.version += 1;
        Ok(&self.current)
    }

    /// Recompute the initial state, discarding everything since.
    pub fn reset(&mut self) -> Result<()> {
        self.current = initial_state(&self.owner, self.reducer.as_ref())?;
        self.version = 0;
        Ok(())
    }
}

fn initial_state<E>(owner: &str, reducer: &dyn Reducer<E>) -> Result<State> {
    reducer
        .reduce(None, &State::new())
        .map_err(|source| Error::State {
            owner: owner.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counter() -> Arc<dyn Reducer<i64>> {
        Arc::new(|event: Option<&i64>, previous: &State| -> anyhow::Result<State> {
            let mut next = previous.clone();
            let total = previous.get("total").and_then(Value::as_i64).unwrap_or(0);
            let updates = previous.get("updates").and_then(Value::as_i64).unwrap_or(0);
            if let Some(n) = event {
                next.insert("total".to_string(), json!(total + n));
                next.insert("updates".to_string(), json!(updates + 1));
            } else {
                next.insert("total".to_string(), json!(0));
                next.insert("updates".to_string(), json!(0));
            }
            Ok(next)
        })
    }

    #[test]
    fn test_initial_state_from_empty_input() {
        let manager = StateManager::new("worker", counter()).unwrap();
        assert_eq!(manager.current().get("total"), Some(&json!(0)));
        assert_eq!(manager.version(), 0);
    }

    #[test]
    fn test_n_updates_fold_n_times_in_order() {
        let mut manager = StateManager::new("worker", counter()).unwrap();
        for n in 1..=5 {
            manager.update(&n).unwrap();
        }
        assert_eq!(manager.current().get("total"), Some(&json!(15)));
        assert_eq!(manager.current().get("updates"), Some(&json!(5)));
        assert_eq!(manager.version(), 5);

        manager.reset().unwrap();
        assert_eq!(manager.current().get("updates"), Some(&json!(0)));
    }

    #[test]
    fn test_reducer_error_keeps_previous_state() {
        let reducer: Arc<dyn Reducer<i64>> =
            Arc::new(|event: Option<&i64>, previous: &State| -> anyhow::Result<State> {
                match event {
                    Some(n) if *n < 0 => anyhow::bail!("negative event {}", n),
                    Some(n) => {
                        let mut next = previous.clone();
                        next.insert("last".to_string(), json!(n));
                        Ok(next)
                    }
                    None => Ok(State::new()),
                }
            });
        let mut manager = StateManager::new("agent", reducer).unwrap();
        manager.update(&3).unwrap();

        let err = manager.update(&-1).unwrap_err();
        assert!(matches!(err, Error::State { ref owner, .. } if owner == "agent"));
        assert_eq!(manager.current().get("last"), Some(&json!(3)));
        assert_eq!(manager.version(), 1);
    }
}
