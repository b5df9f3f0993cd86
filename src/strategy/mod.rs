// iio-capture/src/strategy/mod.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Capture strategies.
//!
//! Four ways of moving scans from a converter to the ring buffer. They all
//! implement [`CaptureStrategy`] and are picked from the
//! [`CaptureConfig`] when a session is prepared:
//!
//! - [`StrategyKind::Burst`]: polled single-shot conversions, one at a time.
//! - [`StrategyKind::Continuous`]: a trigger interrupt reads each scan.
//! - [`StrategyKind::FifoBatched`]: the device buffers scans and the main
//!   loop drains a batch at each watermark.
//! - [`StrategyKind::ContinuousDma`]: a DMA engine fills a double-buffered
//!   window, copied out on each half completion.

use std::{fmt, str::FromStr, sync::Arc};

use converter_hal::DmaEngine;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    session::{Fault, SessionShared},
    CaptureConfig, Device, Error, OverflowPolicy, Result, RingSink, ScanPlan, Supervisor, Trigger,
};

mod burst;
mod continuous;
mod dma;
mod fifo;

pub use self::continuous::ScanHandler;

/// The strategy used to capture scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Polled single-shot conversions
    #[default]
    Burst,
    /// Trigger-interrupt driven reads
    Continuous,
    /// Double-buffered DMA
    ContinuousDma,
    /// Device FIFO drained at a watermark
    FifoBatched,
}

impl StrategyKind {
    /// Determines if scans are delivered from interrupt context.
    pub fn is_interrupt_driven(&self) -> bool {
        matches!(self, StrategyKind::Continuous | StrategyKind::ContinuousDma)
    }

    /// Determines if the strategy can run without a scan count.
    pub fn allows_open_ended(&self) -> bool {
        self.is_interrupt_driven()
    }

    /// The name used in capture profiles.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Burst => "burst",
            StrategyKind::Continuous => "continuous",
            StrategyKind::ContinuousDma => "continuous_dma",
            StrategyKind::FifoBatched => "fifo_batched",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a profile name, or the short forms "dma" and "fifo".
impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "burst" => Ok(StrategyKind::Burst),
            "continuous" => Ok(StrategyKind::Continuous),
            "continuous_dma" | "dma" => Ok(StrategyKind::ContinuousDma),
            "fifo_batched" | "fifo" => Ok(StrategyKind::FifoBatched),
            _ => Err(Error::InvalidConfig(format!("unknown strategy '{}'", s))),
        }
    }
}

/// What a call to `service()` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Scans are still outstanding.
    Pending,
    /// Only the final, partial batch or window is outstanding.
    Draining,
    /// Every requested scan has been delivered.
    Complete,
}

/// The converter and the buffer it feeds, shared with the interrupt
/// handlers.
pub(crate) struct Frontend {
    pub(crate) device: Device,
    pub(crate) sink: Box<dyn RingSink>,
    words: Vec<u32>,
    bytes: Vec<u8>,
}

impl Frontend {
    pub(crate) fn new(device: Device, sink: Box<dyn RingSink>) -> Self {
        Self {
            device,
            sink,
            words: Vec::new(),
            bytes: Vec::new(),
        }
    }

    /// Sizes the scratch space for `plan`, so no allocation happens in a
    /// handler.
    pub(crate) fn reserve(&mut self, plan: &ScanPlan) {
        self.words = vec![0; plan.channel_count()];
        self.bytes = Vec::with_capacity(plan.bytes_per_scan());
    }

    /// Reads one scan from the device and writes it to the sink.
    pub(crate) fn read_and_push(&mut self, channels: usize) -> Result<()> {
        if self.words.len() != channels {
            self.words.resize(channels, 0);
        }
        self.device.read_one_scan(&mut self.words)?;
        self.bytes.clear();
        self.device.format().encode_scan(&self.words, &mut self.bytes);
        self.sink.write(&self.bytes)
    }

    /// Encodes one scan of raw words and writes it to the sink.
    pub(crate) fn push_words(&mut self, words: &[u32]) -> Result<()> {
        self.bytes.clear();
        self.device.format().encode_scan(words, &mut self.bytes);
        self.sink.write(&self.bytes)
    }
}

impl fmt::Debug for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frontend")
            .field("device", &self.device)
            .field("usable_capacity", &self.sink.usable_capacity())
            .finish()
    }
}

/// Applies the overflow policy to the outcome of one push from a handler.
///
/// Returns `false` once the handler should stop pushing.
pub(crate) fn account(shared: &SessionShared, policy: OverflowPolicy, res: Result<()>) -> bool {
    match res {
        Ok(()) => {
            shared.add_delivered(1);
            true
        }
        Err(Error::BufferFull) if policy == OverflowPolicy::DropScan => {
            shared.add_dropped(1);
            true
        }
        Err(err) => {
            shared.record_fault(Fault::from_error(&err));
            false
        }
    }
}

/// Everything a strategy may touch while the main loop drives it.
pub(crate) struct Hw<'a> {
    pub(crate) frontend: &'a Arc<Mutex<Frontend>>,
    pub(crate) trigger: &'a mut Trigger,
    pub(crate) dma: Option<&'a mut Box<dyn DmaEngine>>,
    pub(crate) shared: &'a Arc<SessionShared>,
    pub(crate) plan: &'a ScanPlan,
    pub(crate) supervisor: Supervisor,
    pub(crate) config: &'a CaptureConfig,
    pub(crate) batches: &'a mut usize,
}

impl Hw<'_> {
    /// Fails with the first fault recorded by a handler, if any.
    pub(crate) fn check_fault(&self) -> Result<()> {
        match self.shared.fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(()),
        }
    }
}

/// One way of getting scans from the converter into the ring buffer.
///
/// The main loop holds the trigger and DMA engine, and never holds the
/// frontend lock while calling into them.
pub(crate) trait CaptureStrategy: Send {
    /// The kind of strategy.
    fn kind(&self) -> StrategyKind;

    /// Checks a request against the hardware before anything is touched.
    fn check(&self, requested: usize, _device: &Device, _has_dma: bool) -> Result<()> {
        if requested == 0 && !self.kind().allows_open_ended() {
            return Err(Error::UnboundedRequest);
        }
        Ok(())
    }

    /// Starts the conversion source.
    fn arm(&mut self, hw: &mut Hw<'_>) -> Result<()>;

    /// Does the main-loop share of the work.
    fn service(&mut self, hw: &mut Hw<'_>) -> Result<Progress>;

    /// Stops the conversion source and unhooks any handler.
    fn disarm(&mut self, hw: &mut Hw<'_>) -> Result<()>;
}

/// Creates the strategy for `kind`.
pub(crate) fn build(kind: StrategyKind) -> Box<dyn CaptureStrategy> {
    match kind {
        StrategyKind::Burst => Box::new(burst::BurstCapture),
        StrategyKind::Continuous => Box::new(continuous::ContinuousCapture),
        StrategyKind::ContinuousDma => Box::new(dma::DmaCapture::default()),
        StrategyKind::FifoBatched => Box::new(fifo::FifoCapture::default()),
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
