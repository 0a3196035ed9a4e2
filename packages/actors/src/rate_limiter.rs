//! Sliding-window start limiter shared by all workers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Allows at most `max` acquisitions within any `window` span.
///
/// Keeps a log of the last `max` start instants. Waiters queue on a fair
/// mutex, so slots are handed out in arrival order. Clones share the log.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    max: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `max` is clamped to at least one start per window.
    pub fn new(max: u32, window: Duration) -> Self {
        let max = usize::try_from(max).unwrap_or(usize::MAX).max(1);
        Self {
            inner: Arc::new(Inner {
                max,
                window,
                starts: Mutex::new(VecDeque::with_capacity(max)),
            }),
        }
    }

    pub fn max(&self) -> usize {
        self.inner.max
    }

    /// Wait for a free slot and take it. Never fails.
    pub async fn acquire(&self) {
        // Held across the sleep so later callers stay behind this one.
        let mut starts = self.inner.starts.lock().await;
        loop {
            let now = Instant::now();
            while starts
                .front()
                .is_some_and(|&start| now.duration_since(start) >= self.inner.window)
            {
                starts.pop_front();
            }

            if starts.len() < self.inner.max {
                starts.push_back(now);
                return;
            }

            if let Some(&oldest) = starts.front() {
                tokio::time::sleep_until(oldest + self.inner.window).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_window_respected(starts: &[Instant], max: usize, window: Duration) {
        for pair in starts.windows(max + 1) {
            let span = pair[max].duration_since(pair[0]);
            assert!(
                span >= window,
                "{} starts within {:?}",
                max + 1,
                span
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_spaced_by_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(1000));
        let origin = Instant::now();

        let mut starts = Vec::new();
        for _ in 0..5 {
            limiter.acquire().await;
            starts.push(Instant::now());
        }

        let offsets: Vec<u128> = starts
            .iter()
            .map(|s| s.duration_since(origin).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 0, 1000, 1000, 2000]);
        assert_window_respected(&starts, 2, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_never_exceed_max_per_window() {
        let limiter = RateLimiter::new(3, Duration::from_millis(500));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut starts = Vec::new();
        for task in tasks {
            starts.push(task.await.expect("task"));
        }
        starts.sort();

        assert_window_respected(&starts, 3, Duration::from_millis(500));
        let last = starts[9].duration_since(starts[0]);
        assert_eq!(last, Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_free_up_after_idle_period() {
        let limiter = RateLimiter::new(1, Duration::from_millis(200));
        limiter.acquire().await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[test]
    fn zero_max_is_clamped() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert_eq!(limiter.max(), 1);
    }
}
