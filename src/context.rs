// ============================================================================
// Operation Context
// ============================================================================
//
// Carries an optional deadline and any number of cancellation signals into
// every persistence call. A context that is already expired or cancelled
// fails before any I/O; an in-flight driver future is raced against both and
// dropped when either fires.
//
// ============================================================================

use crate::core::{OrmError, Result};
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Vec<watch::Receiver<bool>>,
}

/// Cancels every context derived from the one it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

impl Context {
    /// Context without deadline or cancellation.
    pub fn background() -> Self {
        Self::default()
    }

    /// Tightens the deadline to `timeout` from now. A later deadline never
    /// replaces an earlier one.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancel(mut self) -> (Self, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        self.cancel.push(receiver);
        (
            self,
            CancelHandle {
                sender: Arc::new(sender),
            },
        )
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.iter().any(|rx| *rx.borrow())
    }

    /// Fails when the context can no longer start work.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(OrmError::Cancelled("context cancelled".into()));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(OrmError::Cancelled("deadline exceeded".into()));
        }
        Ok(())
    }

    /// Runs `work` unless the context expires or is cancelled first.
    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => future::pending::<()>().await,
            }
        };

        tokio::select! {
            result = work => result,
            _ = expired => Err(OrmError::Cancelled("deadline exceeded".into())),
            _ = self.cancelled() => Err(OrmError::Cancelled("context cancelled".into())),
        }
    }

    /// Resolves once any cancellation signal fires. Never resolves when the
    /// context has none or every handle is gone.
    async fn cancelled(&self) {
        if self.cancel.is_empty() {
            return future::pending().await;
        }
        let waits: Vec<BoxFuture<'static, ()>> = self
            .cancel
            .iter()
            .cloned()
            .map(|mut rx| {
                async move {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        future::pending::<()>().await;
                    }
                }
                .boxed()
            })
            .collect();
        future::select_all(waits).await;
    }
}
