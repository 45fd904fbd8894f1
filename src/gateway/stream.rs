// =============================================================================
// Reconnecting stream driver — exponential backoff around a connect-and-run loop
// =============================================================================
//
// `market_data::trade_stream::run_trade_stream` connects once and returns on
// any error or close, leaving the caller's `main.rs` loop to retry on a flat
// delay. This generalizes that shape: the caller supplies an async connect
// closure; `run_with_backoff` retries it forever with capped exponential
// backoff and resets the delay after any connection that stayed up longer
// than `stable_after`, so a brief blip doesn't get penalized by a backoff
// built up from an earlier, longer outage.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const STABLE_AFTER: Duration = Duration::from_secs(30);

/// Drive `connect` forever (until `cancel` fires), backing off exponentially
/// between attempts. `connect` should run its own receive loop and return
/// when the connection drops.
pub async fn run_with_backoff<F, Fut>(label: &str, cancel: CancellationToken, mut connect: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if cancel.is_cancelled() {
            info!(label, "stream driver cancelled, exiting");
            return;
        }

        let started = Instant::now();
        info!(label, "connecting");
        let outcome = tokio::select! {
            result = connect() => result,
            _ = cancel.cancelled() => {
                info!(label, "cancelled mid-connection");
                return;
            }
        };

        if let Err(e) = outcome {
            warn!(label, error = %e, "stream connection failed");
        } else {
            info!(label, "stream closed cleanly");
        }

        if started.elapsed() >= STABLE_AFTER {
            backoff = INITIAL_BACKOFF;
        } else {
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        info!(label, delay_ms = backoff.as_millis() as u64, "reconnecting after backoff");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => {
                info!(label, "cancelled during backoff sleep");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stops_on_cancellation() {
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let cancel_clone = cancel.clone();

        let handle = tokio::spawn(async move {
            run_with_backoff("test", cancel_clone, || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("simulated disconnect")
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(attempts.load(Ordering::SeqCst) >= 1);
    }
}
