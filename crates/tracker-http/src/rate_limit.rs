//! Process-global rate-limit token gate.
//!
//! The only process-wide singleton in the core: every
//! worker shares one [`RateLimiter`], so the aggregate outbound request rate
//! is bounded regardless of the worker pool size.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

struct State {
    last_request_at: Option<Instant>,
    delay: Duration,
}

/// A single-process token gate enforcing a minimum delay between outbound
/// requests. Clone is cheap (shares the inner state via `Arc`).
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<State>>,
    base_delay: Duration,
}

impl RateLimiter {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                last_request_at: None,
                delay: base_delay,
            })),
            base_delay,
        }
    }

    /// Blocks the caller until the gate's current delay has elapsed since the
    /// last request. Must be awaited immediately before every outbound call.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let wait = match state.last_request_at {
                Some(last) => {
                    let elapsed = now.duration_since(last);
                    state.delay.saturating_sub(elapsed)
                }
                None => Duration::ZERO,
            };
            state.last_request_at = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Doubles the gate's delay for the remainder of the run. Not
    /// idempotent under repeated 429s — each call doubles again.
    pub fn double_delay(&self) {
        let mut state = self.state.lock();
        state.delay *= 2;
        warn!(new_delay_ms = state.delay.as_millis() as u64, "rate limit doubled after 429");
    }

    pub fn current_delay(&self) -> Duration {
        self.state.lock().delay
    }

    pub fn reset(&self) {
        self.state.lock().delay = self.base_delay;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_enforces_minimum_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn double_delay_doubles_from_base() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.double_delay();
        assert_eq!(limiter.current_delay(), Duration::from_millis(200));
        limiter.double_delay();
        assert_eq!(limiter.current_delay(), Duration::from_millis(400));
        limiter.reset();
        assert_eq!(limiter.current_delay(), Duration::from_millis(100));
    }
}
