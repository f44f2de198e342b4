//! Database query timeout helpers
//!
//! A stalled database must not stall the game actor waiting on it, so every
//! store query runs under a deadline.

use std::{future::Future, time::Duration};
use tokio::time::timeout;

use super::errors::StoreError;

/// Default timeout for store queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute a query with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}
