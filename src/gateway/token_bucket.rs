// =============================================================================
// Token bucket — true rate limiting ahead of the venue's own 429s
// =============================================================================
//
// The teacher's `binance::rate_limit::RateLimitTracker` mirrors the venue's
// own reported usage after the fact (read `X-MBX-USED-WEIGHT-1M` off the
// response, refuse the next request if it would exceed a hard cap). That
// catches the venue's limit but never prevents a burst of concurrent callers
// from all passing the pre-flight check in the same instant. This is a real
// token bucket: callers draw down a capacity that refills continuously, so
// concurrent callers serialize against the same counter.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

pub struct TokenBucket {
    capacity: i64,
    refill_per_sec: f64,
    tokens: AtomicI64,
    last_refill: Mutex<Instant>,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity as i64,
            refill_per_sec,
            tokens: AtomicI64::new(capacity as i64),
            last_refill: Mutex::new(Instant::now()),
        }
    }

    fn refill(&self) {
        let mut last = self.last_refill.lock();
        let elapsed = last.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let added = (elapsed * self.refill_per_sec) as i64;
        if added > 0 {
            let current = self.tokens.load(Ordering::Relaxed);
            let next = (current + added).min(self.capacity);
            self.tokens.store(next, Ordering::Relaxed);
            *last = Instant::now();
        }
    }

    /// Try to draw `weight` tokens. Returns `true` and debits the bucket on
    /// success, leaves it untouched and returns `false` otherwise.
    pub fn try_acquire(&self, weight: u32) -> bool {
        self.refill();
        let weight = weight as i64;
        let mut current = self.tokens.load(Ordering::Relaxed);
        loop {
            if current < weight {
                return false;
            }
            match self.tokens.compare_exchange_weak(
                current,
                current - weight,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Block until `weight` tokens are available, then draw them.
    pub async fn acquire(&self, weight: u32) {
        loop {
            if self.try_acquire(weight) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }
    }

    pub fn available(&self) -> i64 {
        self.refill();
        self.tokens.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_down_and_refuses_when_empty() {
        let bucket = TokenBucket::new(10, 0.0);
        assert!(bucket.try_acquire(7));
        assert!(!bucket.try_acquire(7));
        assert!(bucket.try_acquire(3));
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(10, 1000.0);
        assert!(bucket.try_acquire(10));
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(bucket.available() > 0);
    }

    #[tokio::test]
    async fn acquire_blocks_until_refill() {
        let bucket = TokenBucket::new(1, 100.0);
        assert!(bucket.try_acquire(1));
        let start = Instant::now();
        bucket.acquire(1).await;
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
    }
}
