//! Rolling-window rate limiting per backend kind.
//!
//! A call over the ceiling is delayed until the oldest timestamp leaves the
//! window - never rejected.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use parley_core::BackendKind;
use tokio::time::Instant;

pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Admit one call, sleeping as long as the window is full.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().unwrap();
                let now = Instant::now();
                while let Some(&oldest) = calls.front() {
                    if now.duration_since(oldest) >= self.window {
                        calls.pop_front();
                    } else {
                        break;
                    }
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // Lock is released before sleeping.
                let oldest = *calls.front().unwrap();
                self.window - now.duration_since(oldest)
            };

            log::info!("Rate limit reached, delaying call for {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls currently inside the window.
    pub fn in_flight_window(&self) -> usize {
        let mut calls = self.calls.lock().unwrap();
        let now = Instant::now();
        while let Some(&oldest) = calls.front() {
            if now.duration_since(oldest) >= self.window {
                calls.pop_front();
            } else {
                break;
            }
        }
        calls.len()
    }
}

/// One limiter per backend kind; shared across conversations.
pub struct RateLimiterSet {
    limiters: HashMap<BackendKind, RateLimiter>,
}

impl RateLimiterSet {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        let limiters = BackendKind::ALL
            .iter()
            .map(|&kind| (kind, RateLimiter::new(max_calls, window)))
            .collect();
        Self { limiters }
    }

    pub fn get(&self, kind: BackendKind) -> &RateLimiter {
        // The map is populated for every kind at construction.
        &self.limiters[&kind]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn calls_under_ceiling_are_immediate() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight_window(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn third_call_is_delayed_not_rejected() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // Delayed until the oldest call left the 60s window.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn window_frees_up_over_time() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(61)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn limiters_are_independent_per_kind() {
        let set = RateLimiterSet::new(1, Duration::from_secs(60));
        set.get(BackendKind::OpenAi).acquire().await;

        let start = Instant::now();
        set.get(BackendKind::Gemini).acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
