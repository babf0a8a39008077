//! Capability interface and adapters for common callable shapes.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::result::{CapabilityError, FunctionOutput, FunctionStatus};
use super::schema::Arguments;

/// The executable part of a [`Function`](super::Function).
///
/// Arguments arrive already validated and coerced against the function's schema.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, args: Arguments) -> Result<FunctionOutput, CapabilityError>;
}

/// Run a synchronous closure on the blocking thread pool.
///
/// A panic in the closure is resumed on the calling task so that
/// [`Function::execute_call`](super::Function::execute_call) reports it like
/// any other panic.
async fn run_blocking<F, T>(f: Arc<F>, args: Arguments) -> Result<T, CapabilityError>
where
    F: Fn(Arguments) -> T + Send + Sync + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(args)).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(CapabilityError::Fault(anyhow::anyhow!("blocking call aborted: {}", e))),
    }
}

/// Adapter for a synchronous closure.
///
/// The closure runs on tokio's blocking pool, so blocking I/O neither stalls
/// the runtime nor escapes the function timeout.
pub struct SyncFn<F>(Arc<F>);

/// Wrap a synchronous closure as a capability.
pub fn from_fn<F>(f: F) -> SyncFn<F>
where
    F: Fn(Arguments) -> Result<FunctionOutput, CapabilityError> + Send + Sync + 'static,
{
    SyncFn(Arc::new(f))
}

#[async_trait]
impl<F> Capability for SyncFn<F>
where
    F: Fn(Arguments) -> Result<FunctionOutput, CapabilityError> + Send + Sync + 'static,
{
    async fn invoke(&self, args: Arguments) -> Result<FunctionOutput, CapabilityError> {
        run_blocking(Arc::clone(&self.0), args).await?
    }
}

/// Adapter for a closure returning a future (bound methods, remote calls).
pub struct AsyncFn<F>(F);

/// Wrap an async closure as a capability.
pub fn from_async_fn<F, Fut>(f: F) -> AsyncFn<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FunctionOutput, CapabilityError>> + Send,
{
    AsyncFn(f)
}

#[async_trait]
impl<F, Fut> Capability for AsyncFn<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FunctionOutput, CapabilityError>> + Send,
{
    async fn invoke(&self, args: Arguments) -> Result<FunctionOutput, CapabilityError> {
        (self.0)(args).await
    }
}

/// Adapter for closures that report `(status, message, info)` instead of a `Result`.
///
/// Runs on the blocking pool like [`SyncFn`].
pub struct StatusFn<F>(Arc<F>);

/// Wrap a status-tuple closure as a capability.
///
/// `Done` maps to success, `Failed` to [`CapabilityError::Failed`] and `Error`
/// to [`CapabilityError::Fault`].
pub fn from_status_fn<F>(f: F) -> StatusFn<F>
where
    F: Fn(Arguments) -> (FunctionStatus, String, Map<String, Value>) + Send + Sync + 'static,
{
    StatusFn(Arc::new(f))
}

#[async_trait]
impl<F> Capability for StatusFn<F>
where
    F: Fn(Arguments) -> (FunctionStatus, String, Map<String, Value>) + Send + Sync + 'static,
{
    async fn invoke(&self, args: Arguments) -> Result<FunctionOutput, CapabilityError> {
        let (status, message, info) = run_blocking(Arc::clone(&self.0), args).await?;
        match status {
            FunctionStatus::Done => Ok(FunctionOutput { message, info }),
            FunctionStatus::Failed => Err(CapabilityError::Failed { message, info }),
            FunctionStatus::Error => Err(CapabilityError::Fault(anyhow::anyhow!(message))),
        }
    }
}
