//! Reverse-order release of partially acquired resources.
//!
//! Every acquisition pushes the matching release onto a [`Rollback`]. On
//! failure the releases run last-in first-out; their own errors are logged
//! and collected but never replace the error that triggered the rollback.

use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use lamina_common::{LayerError, LayerResult};

type Release = Box<dyn FnOnce() -> BoxFuture<'static, LayerResult<()>> + Send>;

/// A release step that failed during rollback.
#[derive(Debug)]
pub struct RollbackFailure {
    /// The step that failed.
    pub step: &'static str,
    /// Why it failed.
    pub error: LayerError,
}

/// Stack of pending release steps for one operation.
pub struct Rollback {
    operation: &'static str,
    steps: Vec<(&'static str, Release)>,
}

impl Rollback {
    /// Create an empty rollback list for `operation`.
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    /// Register the release of a resource that was just acquired.
    pub fn push<F, Fut>(&mut self, step: &'static str, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = LayerResult<()>> + Send + 'static,
    {
        self.steps.push((step, Box::new(move || release().boxed())));
    }

    /// Number of pending release steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if nothing needs releasing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The operation succeeded: keep every acquired resource.
    pub fn disarm(mut self) {
        self.steps.clear();
    }

    /// Release everything in reverse acquisition order.
    ///
    /// Returns the steps that failed; `cause` is only used for logging.
    pub async fn unwind(mut self, cause: &LayerError) -> Vec<RollbackFailure> {
        let operation = self.operation;
        let steps = std::mem::take(&mut self.steps);
        let mut failures = Vec::new();

        for (step, release) in steps.into_iter().rev() {
            tracing::debug!(operation, step, "Rolling back");
            if let Err(error) = release().await {
                tracing::warn!(
                    operation,
                    step,
                    error = %error,
                    cause = %cause,
                    "Rollback step failed"
                );
                failures.push(RollbackFailure { step, error });
            }
        }

        failures
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            tracing::warn!(
                operation = self.operation,
                pending = self.steps.len(),
                "Rollback dropped with pending release steps; resources may leak"
            );
        }
    }
}

impl std::fmt::Debug for Rollback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rollback")
            .field("operation", &self.operation)
            .field(
                "steps",
                &self.steps.iter().map(|(step, _)| *step).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(
        log: Log,
        name: &'static str,
        fail: bool,
    ) -> impl FnOnce() -> BoxFuture<'static, LayerResult<()>> + Send + 'static {
        move || {
            async move {
                log.lock().push(name);
                if fail {
                    Err(LayerError::invalid(name))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn unwinds_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rollback = Rollback::new("test");
        rollback.push("first", recorder(log.clone(), "first", false));
        rollback.push("second", recorder(log.clone(), "second", false));
        rollback.push("third", recorder(log.clone(), "third", false));

        let failures = rollback.unwind(&LayerError::invalid("boom")).await;

        assert!(failures.is_empty());
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn failed_steps_do_not_stop_unwinding() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rollback = Rollback::new("test");
        rollback.push("first", recorder(log.clone(), "first", false));
        rollback.push("second", recorder(log.clone(), "second", true));

        let failures = rollback.unwind(&LayerError::invalid("boom")).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, "second");
        assert_eq!(*log.lock(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn disarmed_rollback_releases_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut rollback = Rollback::new("test");
        rollback.push("first", recorder(log.clone(), "first", false));
        assert_eq!(rollback.len(), 1);

        rollback.disarm();

        assert!(log.lock().is_empty());
    }
}
