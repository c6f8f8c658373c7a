//! Minimum-duration gate for security sensitive operations.
//!
//! Wrapping a login check in a timebox makes every outcome take at least the
//! same wall-clock time, so response latency does not reveal which branch of
//! the check ran.
//!
//! ```
//! # async fn demo() {
//! use std::time::Duration;
//! use gatehouse::timebox::timebox;
//!
//! let deadline = timebox(Duration::from_millis(500));
//! // ... variable-cost credential check ...
//! deadline.wait().await;
//! # }
//! ```
//!
//! # Invariants
//! - A deadline is fixed when it is created and is consumed by waiting on it.
//! - Waiting never returns before the deadline and never fails when the
//!   deadline has already passed.

use std::time::{Duration, Instant};

/// The end point of a timebox.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a deadline does nothing unless it is waited on"]
pub struct Deadline {
    at: Instant,
}

/// Start a timebox of `duration`. Does not block.
pub fn timebox(duration: Duration) -> Deadline {
    Deadline {
        at: saturating_add(Instant::now(), duration),
    }
}

/// `start + duration`, or the latest representable instant if that overflows.
///
/// Post-conditions:
/// - The result is never earlier than `start`
/// - The result is exactly `start + duration` whenever that is representable
fn saturating_add(start: Instant, duration: Duration) -> Instant {
    let mut at = start;
    let mut left = duration;
    let mut step = duration;
    while !step.is_zero() {
        if let Some(later) = at.checked_add(step) {
            at = later;
            left -= step;
            step = step.min(left);
        } else {
            step /= 2;
        }
    }
    at
}

impl Deadline {
    /// Time left before the deadline, zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_past(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Suspend the calling task until the deadline has passed.
    ///
    /// Other tasks keep running while this one waits. There is no way to cut
    /// the wait short.
    pub async fn wait(self) {
        tokio::time::sleep_until(tokio::time::Instant::from_std(self.at)).await;
    }

    /// Block the calling thread until the deadline has passed.
    pub fn wait_blocking(self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}
