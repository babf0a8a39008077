//! Functions: the leaf actions a worker can take.
//!
//! A [`Function`] pairs a described, typed argument schema with a
//! [`Capability`]. Workers own their functions through an [`ActionSpace`]
//! and the remote planner picks among them by name.

mod capability;
mod result;
mod schema;

pub use capability::{from_async_fn, from_fn, from_status_fn, AsyncFn, Capability, StatusFn, SyncFn};
pub use result::{
    CapabilityError, FunctionOutput, FunctionResult, FunctionStatus, INTERNAL_ERROR_KEY,
    TIMEOUT_KEY, VALIDATION_ERROR_KEY,
};
pub use schema::{ArgType, Argument, ArgumentError, Arguments};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// What the planner sees of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub args: Vec<Argument>,
}

/// A named, described callable with a typed argument schema.
///
/// Immutable once constructed.
#[derive(Clone)]
pub struct Function {
    name: String,
    description: String,
    hint: Option<String>,
    args: Vec<Argument>,
    capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("hint", &self.hint)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl Function {
    /// Create a function, checking its schema.
    ///
    /// # Errors
    /// [`Error::InvalidSchema`] for an empty name, empty or duplicate argument
    /// names, or a default that does not fit its declared type.
    pub fn new<C>(
        name: impl Into<String>,
        description: impl Into<String>,
        args: Vec<Argument>,
        capability: C,
    ) -> Result<Self>
    where
        C: Capability + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidSchema {
                function: name,
                reason: "function name cannot be empty".to_string(),
            });
        }
        schema::check_schema(&args).map_err(|reason| Error::InvalidSchema {
            function: name.clone(),
            reason,
        })?;

        Ok(Self {
            name,
            description: description.into(),
            hint: None,
            args,
            capability: Arc::new(capability),
        })
    }

    /// Attach a usage hint for the planner.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    pub fn descriptor(&self) -> FunctionDescriptor {
        FunctionDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            hint: self.hint.clone(),
            args: self.args.clone(),
        }
    }

    /// Validate `args` and invoke the capability once.
    pub async fn execute(&self, args: Arguments) -> FunctionResult {
        self.execute_call(None, args, None).await
    }

    /// Validate `args` and invoke the capability at most once.
    ///
    /// `action_id` is echoed into the result when the planner supplied one;
    /// otherwise a fresh id is generated. With a `timeout`, an overrunning
    /// capability is abandoned and reported as failed.
    pub async fn execute_call(
        &self,
        action_id: Option<String>,
        args: Arguments,
        timeout: Option<Duration>,
    ) -> FunctionResult {
        let action_id = action_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let validated = match schema::validate_arguments(&self.args, args) {
            Ok(validated) => validated,
            Err(e) => {
                tracing::warn!("Rejected arguments for {}: {}", self.name, e);
                let mut info = Map::new();
                info.insert(VALIDATION_ERROR_KEY.to_string(), Value::Bool(true));
                info.insert("argument".to_string(), json!(e.argument()));
                return self.result(action_id, FunctionStatus::Error, e.to_string(), info);
            }
        };

        tracing::debug!("Executing function {} ({})", self.name, action_id);
        let invocation = AssertUnwindSafe(self.capability.invoke(validated)).catch_unwind();

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Function {} timed out after {:?}", self.name, limit);
                    let mut info = Map::new();
                    info.insert(TIMEOUT_KEY.to_string(), Value::Bool(true));
                    return self.result(
                        action_id,
                        FunctionStatus::Failed,
                        format!("timed out after {:?}", limit),
                        info,
                    );
                }
            },
            None => invocation.await,
        };

        match outcome {
            Ok(Ok(output)) => {
                self.result(action_id, FunctionStatus::Done, output.message, output.info)
            }
            Ok(Err(CapabilityError::Failed { message, info })) => {
                tracing::debug!("Function {} failed: {}", self.name, message);
                self.result(action_id, FunctionStatus::Failed, message, info)
            }
            Ok(Err(CapabilityError::Fault(e))) => {
                tracing::warn!("Function {} raised an internal error: {:#}", self.name, e);
                self.internal_error(action_id, format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!("Function {} panicked: {}", self.name, message);
                self.internal_error(action_id, message)
            }
        }
    }

    fn internal_error(&self, action_id: String, message: String) -> FunctionResult {
        let mut info = Map::new();
        info.insert(INTERNAL_ERROR_KEY.to_string(), Value::Bool(true));
        self.result(action_id, FunctionStatus::Error, message, info)
    }

    fn result(
        &self,
        action_id: String,
        status: FunctionStatus,
        message: String,
        info: Map<String, Value>,
    ) -> FunctionResult {
        FunctionResult::new(action_id, self.name.clone(), status, message, info)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Ordered set of functions owned by one worker. Names are unique.
#[derive(Debug, Clone, Default)]
pub struct ActionSpace {
    functions: Vec<Function>,
}

impl ActionSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an action space, rejecting duplicate names.
    pub fn from_functions(functions: impl IntoIterator<Item = Function>) -> Result<Self> {
        let mut space = Self::new();
        for function in functions {
            space.register(function)?;
        }
        Ok(space)
    }

    /// Add a function.
    ///
    /// # Errors
    /// [`Error::DuplicateFunction`] if the name is taken.
    pub fn register(&mut self, function: Function) -> Result<()> {
        if self.has_function(function.name()) {
            return Err(Error::DuplicateFunction(function.name().to_string()));
        }
        self.functions.push(function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<FunctionDescriptor> {
        self.functions.iter().map(Function::descriptor).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
