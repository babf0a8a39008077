//! Cooperative cancellation shared between an agent and its workers.

use tokio_util::sync::CancellationToken;

/// Handle for stopping a running agent or worker.
///
/// Checked at the top of every cycle and between a decision and its
/// execution. A function that is already running is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A handle that stops when this one does, but can also stop on its own.
    pub(crate) fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    /// Wait until a stop is requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_parent_stop_reaches_child() {
        let parent = StopHandle::new();
        let child = parent.child();
        assert!(!child.is_stopped());

        parent.stop();
        child.stopped().await;
        assert!(child.is_stopped());
    }

    #[test]
    fn test_child_stop_does_not_reach_parent() {
        let parent = StopHandle::new();
        let child = parent.child();
        child.stop();
        assert!(child.is_stopped());
        assert!(!parent.is_stopped());
    }
}
