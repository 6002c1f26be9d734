use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{ResolverError, Result};

/// Run a fallible source lookup with a deadline. Elapsing maps to `ResolverError::Timeout`.
pub async fn with_timeout<F, T>(source_name: &str, duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ResolverError::Timeout {
            source_name: source_name.to_string(),
            timeout_ms: duration.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_error() {
        let result: Result<()> = with_timeout("registry", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ResolverError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let result = with_timeout("database", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
