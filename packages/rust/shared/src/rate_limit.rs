//! Sliding-window rate limiter for outbound API calls.
//!
//! Grants at most `max_permits` permits in any trailing window of `window`
//! length. Shared across tasks behind an `Arc`.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{DigestError, Result};

/// Sliding-window limiter: "at most N permits per rolling window of W".
#[derive(Debug)]
pub struct RateLimiter {
    max_permits: usize,
    window: Duration,
    /// Grant timestamps, oldest first, pruned to the trailing window.
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter granting `max_permits` per `window`.
    pub fn new(max_permits: usize, window: Duration) -> Result<Self> {
        if max_permits == 0 {
            return Err(DigestError::config("rate limiter needs at least one permit"));
        }
        if window.is_zero() {
            return Err(DigestError::config("rate limiter window must be non-zero"));
        }

        Ok(Self {
            max_permits,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_permits)),
        })
    }

    /// Permits per window.
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait for a permit.
    ///
    /// With `timeout = None`, or a timeout too large to form a deadline, this
    /// waits indefinitely. Otherwise it fails with
    /// [`DigestError::RateLimitTimeout`] as soon as it is clear no permit frees
    /// up before the deadline; nothing is granted in that case.
    ///
    /// The window lock is only held while checking and pruning. Between checks
    /// the task sleeps until the oldest grant expires.
    pub async fn acquire(&self, timeout: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let deadline = timeout.and_then(|t| start.checked_add(t));

        loop {
            let wait = match self.try_grant(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline || now.checked_add(wait).is_none_or(|at| at > deadline) {
                    debug!(
                        waited_ms = now.duration_since(start).as_millis(),
                        "rate limit permit not available before deadline"
                    );
                    return Err(DigestError::RateLimitTimeout {
                        waited: now.duration_since(start),
                    });
                }
            }

            trace!(wait_ms = wait.as_millis(), "waiting for rate limit window");
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of permits grantable right now. A point-in-time estimate, not a reservation.
    pub fn available_permits(&self) -> usize {
        let mut grants = self.lock();
        prune(&mut grants, Instant::now(), self.window);
        self.max_permits.saturating_sub(grants.len())
    }

    /// Grant a permit, or report how long until the oldest grant expires.
    fn try_grant(&self, now: Instant) -> std::result::Result<(), Duration> {
        let mut grants = self.lock();
        prune(&mut grants, now, self.window);

        match grants.front() {
            Some(&oldest) if grants.len() >= self.max_permits => {
                Err(oldest
                    .checked_add(self.window)
                    .map_or(Duration::MAX, |expiry| expiry.saturating_duration_since(now)))
            }
            _ => {
                grants.push_back(now);
                Ok(())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The window holds plain timestamps; a panicked holder cannot leave it inconsistent.
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop grants that have left the trailing window.
fn prune(grants: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = grants.front() {
        if oldest.checked_add(window).is_some_and(|expiry| expiry <= now) {
            grants.pop_front();
        } else {
            break;
        }
    }
}
