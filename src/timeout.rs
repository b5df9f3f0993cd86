// iio-capture/src/timeout.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Bounded waits on hardware.
//!
//! Every wait for a hardware flag goes through [`Supervisor::wait_until()`].
//! A wait is a busy-poll with a decrementing counter rather than a
//! wall-clock deadline, since the main loop has no clock it can yield to.
//! Bounds are written as durations and turned into poll counts here, with
//! one [`PollRate`] per platform.
//!
//! The calibration assumes each poll is a bus read. Waits on progress made
//! in interrupt context only load a few atomics, so they go through
//! [`Supervisor::observe_until()`], which sleeps one poll period per tick.

use std::{hint, thread, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Polls per millisecond on the reference target (a Cortex-M4 at 80 MHz
/// polling a SPI status register).
///
/// Measured, not derived. Faster cores or slower buses need their own
/// value.
pub const DEFAULT_POLLS_PER_MS: u32 = 100;

/// How many predicate polls fit in one millisecond on a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollRate(u32);

impl PollRate {
    /// Creates a poll rate of `polls_per_ms` polls per millisecond.
    pub const fn new(polls_per_ms: u32) -> Self {
        Self(polls_per_ms)
    }

    /// Gets the number of polls per millisecond.
    pub fn polls_per_ms(&self) -> u32 {
        self.0
    }

    /// Converts a duration into a poll count. Never less than one poll.
    pub fn ticks(&self, dur: Duration) -> u32 {
        let us = dur.as_micros();
        let ticks = us * u128::from(self.0) / 1000;
        ticks.clamp(1, u128::from(u32::MAX)) as u32
    }

    /// The time taken by one poll. Zero above a million polls per
    /// millisecond.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000 / u64::from(self.0.max(1)))
    }
}

impl Default for PollRate {
    fn default() -> Self {
        Self(DEFAULT_POLLS_PER_MS)
    }
}

/// The bound of a single wait, as a number of polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    ticks: u32,
}

impl Timeout {
    /// A bound of exactly `ticks` polls after the first one.
    pub const fn from_ticks(ticks: u32) -> Self {
        Self { ticks }
    }

    /// A bound of `dur` on a platform polling at `rate`.
    pub fn from_duration(dur: Duration, rate: PollRate) -> Self {
        Self {
            ticks: rate.ticks(dur),
        }
    }

    /// The number of polls allowed after the first one.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// Polls `ready` until it returns `true` or the bound runs out.
///
/// The predicate is polled once, then once more for every tick of `bound`.
/// An error from the predicate (a failed status read) ends the wait
/// immediately. `what` names the awaited condition in the timeout error.
pub fn wait_until<F>(ready: F, bound: Timeout, what: &'static str) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    poll(ready, bound, what, hint::spin_loop)
}

/// Polls `ready` like [`wait_until()`], pausing for `period` between polls.
///
/// A zero period yields the thread instead.
pub fn wait_paced<F>(ready: F, bound: Timeout, period: Duration, what: &'static str) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    poll(ready, bound, what, || {
        if period.is_zero() {
            thread::yield_now();
        }
        else {
            thread::sleep(period);
        }
    })
}

fn poll<F, P>(mut ready: F, bound: Timeout, what: &'static str, mut pause: P) -> Result<()>
where
    F: FnMut() -> Result<bool>,
    P: FnMut(),
{
    let mut remaining = bound.ticks;
    loop {
        if ready()? {
            return Ok(());
        }
        if remaining == 0 {
            return Err(Error::TimedOut(what));
        }
        remaining -= 1;
        pause();
    }
}

/// Applies one configured bound to every hardware wait of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supervisor {
    bound: Timeout,
    period: Duration,
}

impl Supervisor {
    /// Creates a supervisor allowing `dur` per wait at `rate`.
    pub fn new(dur: Duration, rate: PollRate) -> Self {
        Self {
            bound: Timeout::from_duration(dur, rate),
            period: rate.period(),
        }
    }

    /// Creates a supervisor with an explicit poll count per wait.
    ///
    /// Its paced waits yield between polls rather than sleep.
    pub fn with_bound(bound: Timeout) -> Self {
        Self {
            bound,
            period: Duration::ZERO,
        }
    }

    /// The bound applied to each wait.
    pub fn bound(&self) -> Timeout {
        self.bound
    }

    /// Waits for `ready` within the configured bound.
    pub fn wait_until<F>(&self, what: &'static str, ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        wait_until(ready, self.bound, what)
    }

    /// Waits for progress made in interrupt context, such as a scan
    /// delivered by a trigger handler.
    ///
    /// Each tick sleeps for one poll period, so the bound holds in real
    /// time however cheap `ready` is.
    pub fn observe_until<F>(&self, what: &'static str, ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        wait_paced(ready, self.bound, self.period, what)
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
