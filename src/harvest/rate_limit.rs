//! Dual-window request governor
//!
//! Enforces two simultaneous quotas against the shared upstream key: at most `S` requests in
//! any short window and at most `L` requests in any long window. Each window keeps a log of
//! the instants it admitted, so every interval of the window length (not just aligned buckets)
//! stays within its cap.
//!
//! Waiting goes through the [`Clock`] trait. [`TokioClock`] suspends the calling task, letting
//! other in-flight fetches progress; [`SimulatedClock`] advances virtual time instantly and is
//! what the compliance tests drive.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use super::config::RateConfig;
use crate::metrics;

/// Time source and suspension strategy for the governor
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio's timer; waiting yields to other tasks
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` advances time immediately instead of waiting
#[derive(Debug)]
pub struct SimulatedClock {
    origin: Instant,
    elapsed_nanos: AtomicU64,
}

impl SimulatedClock {
    /// Clock starting at virtual time zero
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_nanos: AtomicU64::new(0),
        }
    }

    /// Move virtual time forward
    pub fn advance(&self, duration: Duration) {
        self.elapsed_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Virtual time since creation
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_nanos.load(Ordering::SeqCst))
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// A single quota: at most `max_requests` within any `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    /// Maximum requests admitted per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

impl WindowLimit {
    /// Create a limit; a cap of zero is raised to one
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
        }
    }
}

#[derive(Debug, Default)]
struct WindowLog {
    admitted: VecDeque<Instant>,
}

impl WindowLog {
    /// Time until one more request fits under `limit`
    fn required_wait(&mut self, limit: WindowLimit, now: Instant) -> Duration {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= limit.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }

        if self.admitted.len() < limit.max_requests {
            return Duration::ZERO;
        }

        let blocking = self.admitted[self.admitted.len() - limit.max_requests];
        limit
            .window
            .saturating_sub(now.saturating_duration_since(blocking))
    }
}

#[derive(Debug, Default)]
struct GovernorState {
    short: WindowLog,
    long: WindowLog,
    admitted: u64,
    total_wait: Duration,
}

/// Dual sliding-window rate governor shared by every outbound request
pub struct RateGovernor {
    short: WindowLimit,
    long: WindowLimit,
    clock: Arc<dyn Clock>,
    state: Mutex<GovernorState>,
}

impl RateGovernor {
    /// Governor on the tokio clock
    pub fn new(short: WindowLimit, long: WindowLimit) -> Self {
        Self::with_clock(short, long, Arc::new(TokioClock))
    }

    /// Governor on the tokio clock using configured windows
    pub fn from_config(config: &RateConfig) -> Self {
        Self::new(config.short, config.long)
    }

    /// Governor on an explicit clock
    pub fn with_clock(short: WindowLimit, long: WindowLimit, clock: Arc<dyn Clock>) -> Self {
        Self {
            short,
            long,
            clock,
            state: Mutex::new(GovernorState::default()),
        }
    }

    /// Wait until one more request complies with both windows, then admit it.
    ///
    /// Called once immediately before every outbound request. Concurrent callers queue on an
    /// internal lock, so window bookkeeping is one critical section. Returns how long this
    /// caller was held back by the windows.
    pub async fn acquire(&self) -> Duration {
        let mut state = self.state.lock().await;
        let mut waited = Duration::ZERO;

        loop {
            let now = self.clock.now();
            let short_wait = state.short.required_wait(self.short, now);
            let long_wait = state.long.required_wait(self.long, now);
            let wait = short_wait.max(long_wait);
            if wait.is_zero() {
                break;
            }

            debug!(
                wait_ms = wait.as_millis() as u64,
                short_window_full = !short_wait.is_zero(),
                long_window_full = !long_wait.is_zero(),
                "Rate window full, waiting"
            );
            self.clock.sleep(wait).await;
            waited += wait;
        }

        let now = self.clock.now();
        state.short.admitted.push_back(now);
        state.long.admitted.push_back(now);
        state.admitted += 1;
        state.total_wait += waited;

        if !waited.is_zero() {
            metrics::record_governor_wait(waited);
        }
        waited
    }

    /// Requests admitted so far
    pub async fn admitted(&self) -> u64 {
        self.state.lock().await.admitted
    }

    /// Total time callers spent waiting on the windows
    pub async fn total_wait(&self) -> Duration {
        self.state.lock().await.total_wait
    }

    /// Short window limit
    pub fn short_limit(&self) -> WindowLimit {
        self.short
    }

    /// Long window limit
    pub fn long_limit(&self) -> WindowLimit {
        self.long
    }
}
