//! Bounded retry and readiness polling.
//!
//! [`RetryPolicy`] re-runs a failing step a fixed number of times with a
//! fixed backoff. [`PollPolicy`] waits for a condition to become true,
//! doubling the delay between probes up to a cap, and gives up with
//! [`Error::Timeout`] once the deadline would be exceeded.
//!
//! Both take an interrupt flag. Once it is set no further attempt or probe
//! starts, and a pending backoff ends early with [`Error::Interrupted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Longest uninterrupted sleep slice while backing off.
const INTERRUPT_CHECK: Duration = Duration::from_millis(100);

/// `Err(Error::Interrupted)` once `interrupt` is set.
pub fn check_interrupted(interrupt: &AtomicBool) -> Result<()> {
    if interrupt.load(Ordering::SeqCst) {
        Err(Error::Interrupted)
    } else {
        Ok(())
    }
}

/// Sleep for `duration`, returning early with [`Error::Interrupted`] when
/// `interrupt` is set.
pub fn sleep_unless_interrupted(interrupt: &AtomicBool, duration: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        check_interrupted(interrupt)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(());
        }
        thread::sleep(remaining.min(INTERRUPT_CHECK));
    }
}

/// Fixed-count retry with a fixed delay after each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as one.
    pub attempts: u32,
    /// Delay after a failed attempt before the next one.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }

    /// Number of attempts actually made before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. When every attempt fails the
    /// last error is returned. A failure observed after `interrupt` was set
    /// is reported as [`Error::Interrupted`] and not retried.
    pub fn run<T, F>(&self, interrupt: &AtomicBool, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            check_interrupted(interrupt)?;
            let e = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            check_interrupted(interrupt)?;
            if attempt >= attempts {
                return Err(e);
            }
            tracing::warn!(
                "attempt {attempt}/{attempts} failed: {e}. Retrying in {}s...",
                self.backoff.as_secs()
            );
            sleep_unless_interrupted(interrupt, self.backoff)?;
            attempt += 1;
        }
    }
}

/// Condition polling with doubling backoff and an overall deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

/// Result of a single readiness probe.
#[derive(Debug, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    /// Not ready yet; the reason is kept for the timeout message.
    Pending(String),
}

impl PollPolicy {
    pub const fn new(timeout: Duration, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            timeout,
            initial_delay,
            max_delay,
        }
    }

    /// Delay before probe number `n + 1` (0-based `n` failed probes so far).
    pub fn delay_for(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n.min(31)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Probe until ready. The probe runs at least once unless `interrupt`
    /// is already set.
    ///
    /// `Err` from the probe is fatal and returned immediately; only
    /// [`Probe::Pending`] is retried.
    pub fn wait_for<T, F>(&self, what: &str, interrupt: &AtomicBool, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Result<Probe<T>>,
    {
        let started = Instant::now();
        let mut failures = 0u32;
        loop {
            check_interrupted(interrupt)?;
            let reason = match probe() {
                Ok(Probe::Ready(value)) => return Ok(value),
                Ok(Probe::Pending(reason)) => reason,
                Err(e) => {
                    check_interrupted(interrupt)?;
                    return Err(e);
                }
            };
            let delay = self.delay_for(failures);
            let elapsed = started.elapsed();
            if elapsed + delay > self.timeout {
                return Err(Error::Timeout {
                    what: what.to_string(),
                    waited: elapsed,
                    last: Some(reason),
                });
            }
            tracing::debug!("{what} not ready ({reason}); next check in {delay:?}");
            sleep_unless_interrupted(interrupt, delay)?;
            failures += 1;
        }
    }
}
