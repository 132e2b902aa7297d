//! Sliding-window rate limiting with retry and exponential backoff.
//!
//! Wraps every outbound provider call. The limiter owns its timestamp
//! ledger; one instance is shared by all callers funneling to the same
//! provider, so the "never more than N invocation starts per rolling
//! window" guarantee holds across concurrent turns. State is per-process
//! only: independent processes need an external shared counter to
//! coordinate, which this module does not provide.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::ProviderError;

/// Safety buffer added when sleeping until the oldest timestamp leaves the
/// window, so the re-check after waking finds a free slot.
const WINDOW_SAFETY_BUFFER: Duration = Duration::from_millis(100);

/// Rate-limit and retry configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum invocation starts per rolling window.
    pub max_requests: usize,
    /// Width of the rolling window.
    pub window: Duration,
    /// Minimum spacing between consecutive invocations.
    pub min_delay: Duration,
    /// Retry budget for throttling-class errors.
    pub max_retries: u32,
    /// Backoff for retry n is `backoff_base * 2^n`, capped.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            min_delay: Duration::from_secs(1),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

/// Shared sliding-window limiter and retry executor.
///
/// Cloning shares the ledger. Timestamps come from `tokio::time`, so tests
/// run deterministically under a paused runtime clock.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    ledger: Arc<Mutex<VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            ledger: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of timestamps currently inside the window.
    pub fn window_len(&self) -> usize {
        let mut ledger = self.ledger.lock();
        Self::purge(&mut ledger, Instant::now(), self.config.window);
        ledger.len()
    }

    /// Execute `op` under the rate limit, retrying throttling-class errors
    /// with exponential backoff up to the configured budget. Any other
    /// error propagates immediately, unretried.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.acquire(attempt).await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_throttling() && attempt < self.config.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "throttling error (attempt {}/{}): {}",
                        attempt,
                        self.config.max_retries + 1,
                        err
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Wait for a window slot, then record the invocation timestamp.
    ///
    /// The check and the record happen under one lock acquisition, so two
    /// tasks cannot both observe the same free slot; all sleeping happens
    /// with the lock released. The timestamp is recorded at the moment of
    /// actual invocation, never at scheduling time.
    async fn acquire(&self, retry: u32) {
        if retry > 0 {
            let shift = retry.min(u32::BITS - 1);
            let backoff = self
                .config
                .backoff_base
                .saturating_mul(1u32 << shift)
                .min(self.config.backoff_cap);
            log::info!("retry {retry}: backing off {backoff:?}");
            tokio::time::sleep(backoff).await;
        }

        loop {
            let wait = {
                let mut ledger = self.ledger.lock();
                let now = Instant::now();
                Self::purge(&mut ledger, now, self.config.window);

                if ledger.len() >= self.config.max_requests {
                    // Window full: sleep until the oldest entry exits, then
                    // loop and re-check rather than assuming a slot.
                    ledger.front().map(|oldest| {
                        self.config
                            .window
                            .saturating_sub(now.duration_since(*oldest))
                            + WINDOW_SAFETY_BUFFER
                    })
                } else if let Some(last) = ledger.back() {
                    let since_last = now.duration_since(*last);
                    if since_last < self.config.min_delay {
                        Some(self.config.min_delay - since_last)
                    } else {
                        ledger.push_back(now);
                        None
                    }
                } else {
                    ledger.push_back(now);
                    None
                }
            };

            match wait {
                Some(duration) => {
                    log::debug!("rate limit: waiting {duration:?} before next request");
                    tokio::time::sleep(duration).await;
                }
                None => return,
            }
        }
    }

    /// Drop timestamps older than the window. Called lazily before every
    /// scheduling decision; there is no background timer.
    fn purge(ledger: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while ledger
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            ledger.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn fast_config() -> RateLimitConfig {
        RateLimitConfig {
            max_requests: 10,
            window: Duration::from_millis(60_000),
            min_delay: Duration::from_millis(1_000),
            max_retries: 3,
            backoff_base: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(30_000),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_delay_enforced_between_calls() {
        let limiter = RateLimiter::new(fast_config());
        let start = Instant::now();
        for _ in 0..3 {
            limiter
                .execute(|| async { Ok::<_, ProviderError>(()) })
                .await
                .unwrap();
        }
        // Three calls: two enforced 1s gaps.
        assert!(start.elapsed() >= Duration::from_millis(2_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_limit_delays_excess_call() {
        let limiter = RateLimiter::new(fast_config());
        let start = Instant::now();
        for _ in 0..11 {
            limiter
                .execute(|| async { Ok::<_, ProviderError>(()) })
                .await
                .unwrap();
        }
        // The 11th call cannot start earlier than one full window after
        // the 1st call's start.
        assert!(start.elapsed() >= Duration::from_millis(60_000));
        assert!(limiter.window_len() <= 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_error_retried_then_succeeds() {
        init_logs();
        let limiter = RateLimiter::new(fast_config());
        let calls = AtomicU32::new(0);
        let result = limiter
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::new("429 rate limit exceeded"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_follow_exponential_schedule() {
        let limiter = RateLimiter::new(fast_config());
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        limiter
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::new("quota exceeded"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        // Retry 1 backs off 2s, retry 2 backs off 4s, plus min-delay gaps.
        assert!(start.elapsed() >= Duration::from_millis(6_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_capped() {
        init_logs();
        let config = RateLimitConfig {
            max_retries: 6,
            ..fast_config()
        };
        let limiter = RateLimiter::new(config);
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        limiter
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 6 {
                        Err(ProviderError::new("model overloaded"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await
            .unwrap();
        // Uncapped schedule would be 2+4+8+16+32+64 = 126s of backoff; the
        // 30s cap trims retries 5 and 6 to 30s each: 2+4+8+16+30+30 = 90s.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90_000));
        assert!(elapsed < Duration::from_millis(126_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted_returns_error() {
        let limiter = RateLimiter::new(fast_config());
        let calls = AtomicU32::new(0);
        let err = limiter
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::new("rate limit")) }
            })
            .await
            .unwrap_err();
        assert!(err.is_throttling());
        // Initial attempt plus max_retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_throttling_error_not_retried() {
        let limiter = RateLimiter::new(fast_config());
        let calls = AtomicU32::new(0);
        let err = limiter
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ProviderError::new("invalid api key")) }
            })
            .await
            .unwrap_err();
        assert!(!err.is_throttling());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_ledger_across_clones() {
        let limiter = RateLimiter::new(fast_config());
        let clone = limiter.clone();
        limiter
            .execute(|| async { Ok::<_, ProviderError>(()) })
            .await
            .unwrap();
        clone
            .execute(|| async { Ok::<_, ProviderError>(()) })
            .await
            .unwrap();
        assert_eq!(limiter.window_len(), 2);
    }
}
