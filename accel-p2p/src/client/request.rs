use crate::error::{AccelError, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

const QUEUED: u8 = 0;
const EXECUTING: u8 = 1;
const COMPLETED: u8 = 2;

/// Progress of a non-blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Submitted, not yet picked up by the runtime.
    Queued,
    /// Running; may be waiting on the peer.
    Executing,
    /// Finished, successfully or not. `wait` returns immediately.
    Completed,
}

/// A handle to a non-blocking send or receive.
///
/// The operation runs in a spawned task that owns the buffer; `wait`
/// returns the buffer (and, for receives, the element count) together with
/// the outcome.
///
/// If dropped without being waited on, the task is aborted and the buffer
/// it owns is released.
pub struct Request<T> {
    inner: Option<JoinHandle<Result<T>>>,
    status: Arc<AtomicU8>,
}

impl<T: Send + 'static> Request<T> {
    pub(crate) fn spawn(fut: impl Future<Output = Result<T>> + Send + 'static) -> Self {
        let status = Arc::new(AtomicU8::new(QUEUED));
        let task_status = Arc::clone(&status);
        let handle = tokio::spawn(async move {
            task_status.store(EXECUTING, Ordering::Release);
            let result = fut.await;
            task_status.store(COMPLETED, Ordering::Release);
            result
        });
        Self {
            inner: Some(handle),
            status,
        }
    }

    /// Where the request is in its lifecycle.
    pub fn status(&self) -> RequestStatus {
        if self.test() {
            return RequestStatus::Completed;
        }
        match self.status.load(Ordering::Acquire) {
            QUEUED => RequestStatus::Queued,
            EXECUTING => RequestStatus::Executing,
            _ => RequestStatus::Completed,
        }
    }

    /// True once the operation has finished. Never blocks.
    pub fn test(&self) -> bool {
        self.inner.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait for completion and return the outcome.
    pub async fn wait(mut self) -> Result<T> {
        let handle = self.inner.take().ok_or_else(consumed)?;
        join_result(handle.await)
    }

    /// Wait at most `timeout`. `None` means the operation is still running
    /// and the request can be waited on again.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<T>> {
        let Some(handle) = self.inner.as_mut() else {
            return Some(Err(consumed()));
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(joined) => {
                self.inner = None;
                Some(join_result(joined))
            }
            Err(_) => None,
        }
    }
}

fn consumed() -> AccelError {
    AccelError::transport("request result already taken")
}

fn join_result<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(AccelError::Cancelled),
        Err(e) => Err(AccelError::transport_with_source("request task panicked", e)),
    }
}

impl<T> Drop for Request<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.inner {
            handle.abort();
        }
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("done", &self.inner.as_ref().is_none_or(|h| h.is_finished()))
            .finish()
    }
}
