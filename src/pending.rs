//! Handle for a request sent in the background.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::result::GenerationResult;

/// A request running on the Tokio runtime. Await it for the decoded result.
///
/// Dropping the handle does not cancel the request; the response is simply
/// discarded when it arrives.
#[derive(Debug)]
pub struct PendingResult {
    handle: JoinHandle<Result<GenerationResult, ClientError>>,
}

impl PendingResult {
    /// Spawn `future` onto the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Task`] when called outside a Tokio runtime.
    pub(crate) fn spawn<F>(future: F) -> Result<Self, ClientError>
    where
        F: Future<Output = Result<GenerationResult, ClientError>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Task(format!("no async runtime to submit on: {e}")))?;
        Ok(Self { handle: runtime.spawn(future) })
    }

    /// Whether the response has already been received and decoded.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for PendingResult {
    type Output = Result<GenerationResult, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(ClientError::Task(e.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_to_inner_result() {
        let pending = PendingResult::spawn(async {
            Err(ClientError::Service { status: 500, body: "internal error".into() })
        })
        .unwrap();
        let err = pending.await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    fn explode() -> Result<GenerationResult, ClientError> {
        panic!("worker died")
    }

    #[tokio::test]
    async fn panicking_task_is_task_error() {
        let pending = PendingResult::spawn(async { explode() }).unwrap();
        assert!(matches!(pending.await, Err(ClientError::Task(_))));
    }

    #[test]
    fn spawn_outside_runtime_fails() {
        let err = PendingResult::spawn(async { Err(ClientError::Task("unused".into())) }).unwrap_err();
        assert!(matches!(err, ClientError::Task(_)));
    }
}
