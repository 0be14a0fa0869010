use std::future::Future;
use std::time::Duration;

use crate::application::ports::EngineError;

/// Awaits an engine call, failing with `EngineError::Timeout` once `limit` elapses.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, call: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| EngineError::Timeout(limit))?,
        None => call.await,
    }
}
