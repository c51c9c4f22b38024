use std::future::Future;
use std::time::Duration;

/// A store or queue call did not finish within its deadline.
#[derive(Debug, thiserror::Error)]
#[error("{operation} timed out after {limit:?}")]
pub struct DeadlineExceeded {
    pub operation: &'static str,
    pub limit: Duration,
}

/// Run `fut` with a deadline. The future is dropped when the deadline passes.
pub async fn within<F, T>(limit: Duration, operation: &'static str, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DeadlineExceeded { operation, limit })
}
