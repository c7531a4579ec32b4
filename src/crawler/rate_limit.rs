//! Minimum-interval request gate
//!
//! A direct `governor` limiter with a burst of one: each cell is released at
//! least `interval` after the previous one, however many tasks share it.
//! A zero interval disables the gate.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces outbound requests at least `interval` apart
pub struct RateLimiter {
    interval: Duration,
    gate: RwLock<Option<Arc<DirectLimiter>>>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            gate: RwLock::new(Self::build(interval)),
        }
    }

    fn build(interval: Duration) -> Option<Arc<DirectLimiter>> {
        Quota::with_period(interval)
            .map(|quota| Arc::new(GovernorLimiter::direct(quota.allow_burst(NonZeroU32::MIN))))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current limiter; waiting happens on the clone, outside the lock
    fn gate(&self) -> Option<Arc<DirectLimiter>> {
        self.gate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until this caller may issue a request
    pub async fn wait(&self) {
        if let Some(gate) = self.gate() {
            gate.until_ready().await;
            trace!("rate limiter cell granted");
        }
    }

    /// Like [`wait`](Self::wait) but gives up when `token` is cancelled.
    ///
    /// Returns `false` if cancellation won; a cancelled waiter consumes no cell.
    pub async fn wait_or_cancel(&self, token: &CancellationToken) -> bool {
        let Some(gate) = self.gate() else {
            return !token.is_cancelled();
        };
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = gate.until_ready() => true,
        }
    }

    /// Start over with an empty limiter; the next caller proceeds immediately
    pub fn reset(&self) {
        *self.gate.write().unwrap_or_else(PoisonError::into_inner) = Self::build(self.interval);
    }
}
