//! Timeout enforcement.
//!
//! # Responsibilities
//! - Resolve the deadline for a call: per-request override, else the client
//!   read timeout
//! - Wrap engine futures with that deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other transport errors

use std::future::Future;
use std::time::Duration;

use crate::http::error::TransportError;

/// The deadline that applies to a call.
pub fn effective_timeout(overridden: Option<Duration>, client_default: Option<Duration>) -> Option<Duration> {
    overridden.or(client_default)
}

/// Run `fut`, failing with `TransportError::Timeout` once `limit` elapses.
/// `None` waits forever.
pub async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransportError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_beats_default() {
        let default = Some(Duration::from_secs(10));
        assert_eq!(effective_timeout(Some(Duration::from_secs(1)), default), Some(Duration::from_secs(1)));
        assert_eq!(effective_timeout(None, default), default);
        assert_eq!(effective_timeout(None, None), None);
    }

    #[tokio::test]
    async fn slow_future_times_out() {
        let result: Result<(), _> = with_timeout(Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::Timeout(d)) if d == Duration::from_millis(10)));

        let result = with_timeout(None, async { Ok::<_, TransportError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
