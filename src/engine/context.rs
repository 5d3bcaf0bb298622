// Keyhost Engine — Request Context
//
// Caller-supplied cancellation signal plus optional deadline, accepted by
// every core async operation. Dropping a future also cancels it; the context
// exists so a caller can abort work it no longer holds directly (a spawned
// monitor, a fan-out in another task).

use crate::atoms::error::{EngineError, EngineResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        RequestContext { cancel: CancellationToken::new(), deadline: Some(deadline) }
    }

    /// A context cancelled together with `self`, but cancellable on its own.
    pub fn child(&self) -> Self {
        RequestContext { cancel: self.cancel.child_token(), deadline: self.deadline }
    }

    /// Child context whose deadline is the earlier of ours and `now + timeout`.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let at = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) if d < at => d,
            _ => at,
        };
        RequestContext { cancel: self.cancel.child_token(), deadline: Some(deadline) }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast before starting work.
    pub fn check(&self) -> EngineResult<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(EngineError::NetworkTimeout("deadline exceeded".into()));
        }
        Ok(())
    }

    /// Drive `fut` until it completes, the context is cancelled, or the
    /// deadline passes. On cancellation the future is dropped.
    pub async fn run<F, T>(&self, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            _ = expired => Err(EngineError::NetworkTimeout("deadline exceeded".into())),
            res = fut => res,
        }
    }

    /// Cancellable sleep.
    pub async fn sleep(&self, duration: Duration) -> EngineResult<()> {
        self.run(async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}
