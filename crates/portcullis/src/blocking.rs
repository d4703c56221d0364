//! Bounded waits for store access and blocking verification.
//!
//! Anything that may stall (a clustered map lookup, a session write, a
//! synchronous credential check) goes through these helpers so that it
//! either finishes inside the configured limit or fails with
//! [`Error::Timeout`]. Nothing here retries.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Await `fut`, failing with [`Error::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::error!("{operation} did not complete within {}ms", limit.as_millis());
            Err(Error::timeout(operation, limit))
        }
    }
}

/// Run a synchronous closure on the blocking pool, bounded by `limit`.
///
/// The async worker stays free while `f` runs. A panic inside `f` is
/// reported as [`Error::Internal`].
pub async fn run_blocking<T, F>(operation: &str, limit: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    bounded(operation, limit, async move {
        match handle.await {
            Ok(result) => result,
            Err(join_err) => Err(Error::internal(format!("{operation} failed: {join_err}"))),
        }
    })
    .await
}
