// iio-capture/src/session.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Acquisition sessions.
//!
//! A session lives from `prepare()` to the return to [`State::Idle`]. Most
//! of it belongs to the main loop. The part touched from interrupt context
//! is gathered in [`SessionShared`], and each of its fields has exactly one
//! writer for a given strategy:
//!
//! - the scan counter: the trigger/DMA handler in the interrupt-driven
//!   strategies, the main loop in Burst and FIFO capture;
//! - the fault slot and drop counter: the handler.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use nix::errno::Errno;

use crate::{strategy::CaptureStrategy, Error, ScanPlan, StrategyKind};

/// The capture state machine.
///
/// `Idle → Preparing → Armed → Streaming → (Draining) → Idle`, with
/// `Stopping` reachable from any state other than `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// No session.
    #[default]
    Idle,
    /// Channels are configured and the scan plan is fixed.
    Preparing,
    /// The conversion source is armed.
    Armed,
    /// Scans are flowing into the ring buffer.
    Streaming,
    /// The last, partial, batch or window is being collected.
    Draining,
    /// The conversion source is being torn down.
    Stopping,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Idle => "idle",
            State::Preparing => "preparing",
            State::Armed => "armed",
            State::Streaming => "streaming",
            State::Draining => "draining",
            State::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// A fault recorded from interrupt context, for the main loop to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A bus transfer failed in the handler.
    Bus(Errno),
    /// The ring buffer was full and the policy is to abort.
    BufferFull,
    /// The DMA copy-out missed its half-window deadline.
    DmaOverrun,
    /// A handler read returned the wrong number of words.
    BadReturnSize,
}

impl Fault {
    /// Classifies an error raised inside a handler.
    pub(crate) fn from_error(err: &Error) -> Self {
        match err {
            Error::BufferFull => Fault::BufferFull,
            Error::DmaOverrun => Fault::DmaOverrun,
            Error::Bus(errno) => Fault::Bus(*errno),
            Error::ChannelEnable { source, .. } => Fault::Bus(*source),
            _ => Fault::BadReturnSize,
        }
    }
}

impl From<Fault> for Error {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Bus(errno) => Error::Bus(errno),
            Fault::BufferFull => Error::BufferFull,
            Fault::DmaOverrun => Error::DmaOverrun,
            Fault::BadReturnSize => Error::BadReturnSize,
        }
    }
}

/// Session state crossing the interrupt/main-loop boundary.
#[derive(Debug)]
pub struct SessionShared {
    requested: usize,
    delivered: AtomicUsize,
    dropped: AtomicUsize,
    fault: OnceLock<Fault>,
}

impl SessionShared {
    /// Creates the shared state for a session of `requested` scans.
    /// Zero means "until stopped".
    pub fn new(requested: usize) -> Self {
        Self {
            requested,
            delivered: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
            fault: OnceLock::new(),
        }
    }

    /// The number of scans requested.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// The number of scans pushed into the ring buffer.
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Acquire)
    }

    /// The number of scans still to deliver, or `usize::MAX` for an
    /// open-ended session.
    pub fn remaining(&self) -> usize {
        if self.requested == 0 {
            usize::MAX
        }
        else {
            self.requested.saturating_sub(self.delivered())
        }
    }

    /// Determines if a finite request has been met.
    pub fn is_satisfied(&self) -> bool {
        self.requested != 0 && self.delivered() >= self.requested
    }

    pub(crate) fn add_delivered(&self, n: usize) {
        self.delivered.fetch_add(n, Ordering::AcqRel);
    }

    /// The number of scans dropped on a full buffer.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn add_dropped(&self, n: usize) {
        self.dropped.fetch_add(n, Ordering::AcqRel);
    }

    /// Records a fault. Only the first one sticks.
    pub(crate) fn record_fault(&self, fault: Fault) -> bool {
        self.fault.set(fault).is_ok()
    }

    /// The first fault recorded in the session, if any.
    pub fn fault(&self) -> Option<Fault> {
        self.fault.get().copied()
    }
}

/// Statistics for one acquisition session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// The number of scans requested (zero for open-ended)
    pub requested: usize,
    /// The number of scans written to the ring buffer
    pub delivered: usize,
    /// The number of scans dropped on a full buffer
    pub dropped: usize,
    /// The number of bytes written to the ring buffer
    pub bytes_written: usize,
    /// The number of FIFO batches drained
    pub batches: usize,
    /// Time from arming to the last observation
    pub elapsed: Duration,
}

/// One acquisition on one converter.
pub(crate) struct AcquisitionSession {
    pub(crate) strategy: Box<dyn CaptureStrategy>,
    pub(crate) plan: ScanPlan,
    pub(crate) shared: Arc<SessionShared>,
    pub(crate) batches: usize,
    pub(crate) armed_at: Option<Instant>,
}

impl AcquisitionSession {
    pub(crate) fn new(strategy: Box<dyn CaptureStrategy>, plan: ScanPlan, requested: usize) -> Self {
        Self {
            strategy,
            plan,
            shared: Arc::new(SessionShared::new(requested)),
            batches: 0,
            armed_at: None,
        }
    }

    pub(crate) fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    pub(crate) fn stats(&self) -> CaptureStats {
        let delivered = self.shared.delivered();
        CaptureStats {
            requested: self.shared.requested(),
            delivered,
            dropped: self.shared.dropped(),
            bytes_written: delivered * self.plan.bytes_per_scan(),
            batches: self.batches,
            elapsed: self.armed_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }
}

impl fmt::Debug for AcquisitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("strategy", &self.kind())
            .field("plan", &self.plan)
            .field("shared", &self.shared)
            .finish()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
