//! Per-call cancellation and deadlines.
//!
//! Every outbound call runs under a [`CallContext`]. Cancelling the token or
//! passing the deadline drops the in-flight future (closing the connection)
//! and yields [`ModelKitError::Cancelled`] instead of a partial result.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{ModelKitError, Result};

/// Cancellation token plus an optional deadline, cloned into each call.
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an existing token (e.g. one owned by a request handler).
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Give up `timeout` from now.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Fail fast if the call is already dead.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(ModelKitError::Cancelled("call cancelled by caller".into()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ModelKitError::Cancelled("deadline exceeded".into()));
            }
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the token fires or the deadline passes.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                Err(ModelKitError::Cancelled("call cancelled by caller".into()))
            }
            _ = expired => Err(ModelKitError::Cancelled("deadline exceeded".into())),
            res = fut => res,
        }
    }
}
