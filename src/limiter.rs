//! Rate-limited store writes
//!
//! A token bucket paces calls against the external store and adapts its
//! fill rate to throttling feedback: every refresh tick, recent failures
//! shrink the fill, and a fully drained bucket with no failures grows it
//! by 10%. Store calls run inside a retry loop that classifies errors:
//! throttling feeds the bucket and retries indefinitely, transient
//! failures retry with exponential backoff up to a small cap, and
//! everything else surfaces immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};

use crate::{Error, Result};

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Transient failures retry this many times before surfacing.
const TRANSIENT_ATTEMPTS: u32 = 5;
const TRANSIENT_BASE_DELAY_MS: u64 = 100;
const TRANSIENT_MAX_DELAY_MS: u64 = 3200;

#[derive(Debug)]
struct State {
    fill: u32,
    bucket: u32,
    fails: u32,
    dead: bool,
}

/// AIMD token bucket guarding external-store throughput.
pub struct RateLimiter {
    state: Mutex<State>,
    wakeup: Notify,
}

impl RateLimiter {
    /// Create a limiter and spawn its refresh task. The task exits when
    /// the limiter is killed or dropped.
    pub fn start(fill: u32) -> Arc<Self> {
        let limiter = Arc::new(Self {
            state: Mutex::new(State {
                fill,
                bucket: fill,
                fails: 0,
                dead: false,
            }),
            wakeup: Notify::new(),
        });

        let weak = Arc::downgrade(&limiter);
        tokio::spawn(async move {
            let mut interval = time::interval(REFRESH_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                if !limiter.refresh() {
                    break;
                }
            }
        });

        limiter
    }

    /// One refresh tick. Returns false once the limiter is dead.
    fn refresh(&self) -> bool {
        let mut state = self.state.lock();
        if state.dead {
            return false;
        }
        if state.fails > 0 {
            state.fill = state.fill.saturating_sub(state.fails / 2).max(1);
        } else if state.bucket == 0 {
            state.fill = (state.fill as f64 * 1.1).ceil() as u32;
        }
        state.fails = 0;
        state.bucket = state.bucket.max(state.fill);
        tracing::debug!(fill = state.fill, "limiter refresh");
        drop(state);
        self.wakeup.notify_waiters();
        true
    }

    /// Take `n` tokens, waiting for a refresh if the bucket is short.
    /// Observes shutdown rather than blocking forever.
    pub async fn acquire(&self, n: u32) -> Result<()> {
        loop {
            let notified = self.wakeup.notified();
            {
                let mut state = self.state.lock();
                if state.dead {
                    return Err(Error::Shutdown);
                }
                if state.bucket >= n {
                    state.bucket -= n;
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Record a throttling signal; the next refresh shrinks the fill.
    pub fn backoff(&self) {
        self.state.lock().fails += 1;
    }

    /// Stop the refresh loop and fail all waiting acquirers.
    pub fn kill(&self) {
        self.state.lock().dead = true;
        self.wakeup.notify_waiters();
    }

    /// Run a store call under the token bucket with retry classification.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut transient_failures = 0u32;
        loop {
            self.acquire(1).await?;
            match op().await {
                Ok(value) => return Ok(value),
                Err(Error::Throttled) => {
                    tracing::debug!("store throttled, backing off");
                    self.backoff();
                }
                Err(Error::Transient(msg)) => {
                    transient_failures += 1;
                    if transient_failures >= TRANSIENT_ATTEMPTS {
                        return Err(Error::Transient(msg));
                    }
                    let delay = (TRANSIENT_BASE_DELAY_MS << (transient_failures - 1))
                        .min(TRANSIENT_MAX_DELAY_MS);
                    tracing::warn!(error = %msg, delay_ms = delay, "transient store error");
                    time::sleep(Duration::from_millis(delay)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    #[cfg(test)]
    fn snapshot(&self) -> (u32, u32, u32) {
        let state = self.state.lock();
        (state.fill, state.bucket, state.fails)
    }
}
