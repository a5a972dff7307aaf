// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A recurring timer driven by a host-supplied monotonic clock.
//!
//! The host passes "now" as a [`Duration`] since any fixed origin (app start,
//! frame counter converted to time, a test clock). The ticker reports how many
//! intervals elapsed since it last fired.

use core::time::Duration;

/// Fixed-interval timer over a caller-supplied clock.
///
/// After a stall longer than one interval, the ticker fires at most
/// `max_catch_up` times and then re-anchors on the current time, like a
/// platform timer that coalesces missed fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticker {
    interval: Duration,
    next_due: Duration,
    max_catch_up: u32,
}

impl Ticker {
    /// Creates a ticker whose first fire is one `interval` after `now`.
    ///
    /// A zero `interval` is treated as one nanosecond.
    #[must_use]
    pub fn new(interval: Duration, now: Duration) -> Self {
        let interval = interval.max(Duration::from_nanos(1));
        Self {
            interval,
            next_due: now.saturating_add(interval),
            max_catch_up: 1,
        }
    }

    /// Sets how many fires a single [`Ticker::advance`] may report.
    ///
    /// Values below one are raised to one.
    #[must_use]
    pub fn with_max_catch_up(mut self, max_catch_up: u32) -> Self {
        self.max_catch_up = max_catch_up.max(1);
        self
    }

    /// The interval between fires.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The clock value at which the next fire is due.
    #[must_use]
    pub fn next_due(&self) -> Duration {
        self.next_due
    }

    /// Advances the clock to `now` and returns the number of fires due.
    pub fn advance(&mut self, now: Duration) -> u32 {
        if now < self.next_due {
            return 0;
        }
        let behind = (now - self.next_due).as_nanos() / self.interval.as_nanos();
        let due = u32::try_from(behind.saturating_add(1)).unwrap_or(u32::MAX);
        if due > self.max_catch_up {
            self.next_due = now.saturating_add(self.interval);
            return self.max_catch_up;
        }
        self.next_due = self.next_due.saturating_add(self.interval * due);
        due
    }

    /// Restarts the ticker so its next fire is one interval after `now`.
    pub fn reset(&mut self, now: Duration) {
        self.next_due = now.saturating_add(self.interval);
    }
}
