// iio-capture/src/strategy/fifo.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Watermark-batched FIFO capture.
//!
//! The converter runs continuously into its own FIFO. The main loop waits
//! for the FIFO to reach the watermark and drains the batch in a single bus
//! transaction. Before each wait the watermark is set to the smaller of the
//! configured batch size and the number of scans still needed, so a request
//! of 300 scans with a watermark of 256 drains as 256 then 44.
//!
//! The converter paces itself, so the pipeline's trigger is left alone. A
//! batch is ready when the FIFO level read back from the device reaches the
//! programmed watermark; that level poll is the only "batch ready" signal.

use converter_hal::{ConversionMode, TriggerKind};
use log::debug;

use super::{CaptureStrategy, Hw, Progress, StrategyKind};
use crate::{Device, Error, Result};

/// Drains the device FIFO one watermark batch at a time.
#[derive(Debug, Default)]
pub(crate) struct FifoCapture {
    // Configured batch size, in scans.
    watermark: usize,
    // Watermark currently programmed into the device.
    programmed: usize,
    // Staging for one batch of raw words.
    batch: Vec<u32>,
}

impl FifoCapture {
    fn program(&mut self, hw: &mut Hw<'_>, scans: usize) -> Result<()> {
        if scans != self.programmed {
            hw.frontend.lock().device.configure_fifo_watermark(scans)?;
            debug!("FIFO watermark set to {} scans", scans);
            self.programmed = scans;
        }
        Ok(())
    }
}

impl CaptureStrategy for FifoCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FifoBatched
    }

    fn check(&self, requested: usize, device: &Device, _has_dma: bool) -> Result<()> {
        if requested == 0 {
            return Err(Error::UnboundedRequest);
        }
        if device.fifo_depth() == 0 {
            return Err(Error::UnsupportedStrategy(format!(
                "{} has no FIFO",
                device.name()
            )));
        }
        Ok(())
    }

    fn arm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        let depth = hw.frontend.lock().device.fifo_depth();
        self.watermark = hw.config.fifo_watermark.map_or(depth, |wm| wm.min(depth));
        self.programmed = 0;
        self.batch = Vec::with_capacity(self.watermark * hw.plan.channel_count());

        let first = hw.shared.remaining().min(self.watermark);
        self.program(hw, first)?;

        let mut fe = hw.frontend.lock();
        fe.device.configure_trigger_source(TriggerKind::FifoWatermark)?;
        fe.device.set_conversion_mode(ConversionMode::Continuous)
    }

    fn service(&mut self, hw: &mut Hw<'_>) -> Result<Progress> {
        let remaining = hw.shared.remaining();
        if remaining == 0 {
            return Ok(Progress::Complete);
        }

        let want = remaining.min(self.watermark);
        self.program(hw, want)?;

        let frontend = hw.frontend;
        hw.supervisor
            .wait_until("FIFO watermark", || Ok(frontend.lock().device.fifo_level()? >= want))?;

        let n = hw.plan.channel_count();
        self.batch.clear();
        self.batch.resize(want * n, 0);

        let mut fe = frontend.lock();
        let words = fe.device.read_fifo_batch(&mut self.batch)?;
        if words != self.batch.len() {
            return Err(Error::BadReturnSize);
        }
        for scan in self.batch.chunks_exact(n) {
            fe.push_words(scan)?;
            hw.shared.add_delivered(1);
        }
        drop(fe);

        *hw.batches += 1;
        debug!("FIFO batch {} drained: {} scans", hw.batches, want);

        let left = hw.shared.remaining();
        if left == 0 {
            Ok(Progress::Complete)
        }
        else if left < self.watermark {
            Ok(Progress::Draining)
        }
        else {
            Ok(Progress::Pending)
        }
    }

    fn disarm(&mut self, _hw: &mut Hw<'_>) -> Result<()> {
        self.batch.clear();
        Ok(())
    }
}
