//! Periodic JWKS refresh.
//!
//! Picks up rotated keys before any token signed with them arrives, so
//! rotation rarely costs a request a miss-driven refresh. A failed refresh
//! leaves the previous key set in place.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A refresh in
//! progress is bounded by the cache's fetch timeout.

use crate::auth::KeySetCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Refresh `cache` every `period` until `cancel_token` is cancelled.
///
/// The first refresh happens one `period` after start; the caller primes the
/// cache at startup.
pub async fn start_jwks_refresher(
    cache: Arc<KeySetCache>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gateway.task.jwks_refresher",
        interval_seconds = period.as_secs(),
        "JWKS refresher started"
    );

    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = cache.refresh().await {
                    warn!(
                        target: "gateway.task.jwks_refresher",
                        error = %e,
                        "Scheduled JWKS refresh failed"
                    );
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "gateway.task.jwks_refresher",
                    "JWKS refresher received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresher_exits_on_cancel() {
        let cache = Arc::new(KeySetCache::new(
            "http://127.0.0.1:9/.well-known/jwks.json".to_string(),
            Duration::from_millis(100),
        ));
        let token = CancellationToken::new();

        let handle = tokio::spawn(start_jwks_refresher(
            cache,
            Duration::from_secs(3600),
            token.clone(),
        ));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("refresher should exit after cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_running() {
        let cache = Arc::new(KeySetCache::new(
            "http://127.0.0.1:9/.well-known/jwks.json".to_string(),
            Duration::from_millis(50),
        ));
        let token = CancellationToken::new();

        let handle = tokio::spawn(start_jwks_refresher(
            cache.clone(),
            Duration::from_millis(20),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!handle.is_finished());
        assert!(cache.snapshot().await.is_none());

        token.cancel();
        handle.await.unwrap();
    }
}
