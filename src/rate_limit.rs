//! Sliding-window rate limiter keyed by caller address (spec §4.5).
//!
//! Grounded on `dashmap`-backed connection maps for lock-free per-key
//! access, with a detachable `tokio::spawn` ticker following the
//! abort-handle idiom used for the reconnection task elsewhere in this
//! crate.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::ConfigStore;

/// Hard cap on `RateLimiter.windows` between prune intervals (spec §3).
const MAX_WINDOWS: usize = 10_000;
const WINDOW_DURATION: Duration = Duration::from_secs(60);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Configured *by reference* to the config store: the limit is re-read from
/// the live snapshot on every `check`, so a `PATCH /api/settings` changing
/// `rateLimitPerMinute` takes effect on the very next call.
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    config: Arc<ConfigStore>,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new(config: Arc<ConfigStore>) -> Arc<Self> {
        let limiter = Arc::new(RateLimiter {
            windows: DashMap::new(),
            config,
            ticker: parking_lot::Mutex::new(None),
        });
        limiter.clone().spawn_ticker();
        limiter
    }

    fn spawn_ticker(self: Arc<Self>) {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                self.prune();
            }
        });
        *self.ticker.lock() = Some(handle);
    }

    /// Returns `true` if the call is within the limit, `false` if it should
    /// be rejected with `RATE_LIMITED`.
    pub fn check(&self, key: IpAddr) -> bool {
        let limit = self.config.get().server.rate_limit_per_minute;
        let now = Instant::now();

        let allowed = {
            let mut entry = self.windows.entry(key).or_insert_with(|| Window {
                count: 0,
                reset_at: now + WINDOW_DURATION,
            });

            if now >= entry.reset_at {
                entry.count = 1;
                entry.reset_at = now + WINDOW_DURATION;
                true
            } else {
                entry.count += 1;
                entry.count <= limit
            }
        };

        if self.windows.len() > MAX_WINDOWS {
            self.prune();
        }

        allowed
    }

    /// Removes every window whose reset time has already passed.
    pub fn prune(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| window.reset_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.windows.len()
    }

    /// Stops the background prune ticker. The ticker task is otherwise
    /// detached and would not by itself keep the process alive, but callers
    /// that hold a `RateLimiter` past shutdown should still call this for a
    /// clean teardown.
    pub fn destroy(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.destroy();
    }
}
