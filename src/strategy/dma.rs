// iio-capture/src/strategy/dma.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Double-buffered DMA capture.
//!
//! The engine fills a two-half [`DmaWindow`] in a circle. On each half (or
//! full) completion the handler copies the finished half into the ring
//! buffer and gives it back to the engine. For a finite request the
//! engine's stop timer halts it after exactly the requested number of
//! words, and the last, partial, half is flushed like any other.

use std::sync::Arc;

use converter_hal::{ConversionMode, DmaEvent, DmaWindow};
use log::{debug, warn};
use parking_lot::Mutex;

use super::{account, CaptureStrategy, Frontend, Hw, Progress, StrategyKind};
use crate::{
    session::{Fault, SessionShared},
    sys_result, Device, Error, OverflowPolicy, Result,
};

/// Copies completed halves of the window out to the ring buffer.
struct DmaHandler {
    frontend: Arc<Mutex<Frontend>>,
    shared: Arc<SessionShared>,
    window: Arc<DmaWindow>,
    channels: usize,
    policy: OverflowPolicy,
}

impl DmaHandler {
    fn on_event(&self, ev: DmaEvent) {
        let half = ev.half();
        let valid = match ev {
            DmaEvent::Halted { words, .. } => words,
            _ => self.window.half_words(),
        };
        let copied = self.window.read(half, |mem| self.copy_out(&mem[..valid.min(mem.len())]));
        self.window.release_to_hardware(half);
        if copied.is_none() {
            self.shared.record_fault(Fault::DmaOverrun);
        }
    }

    fn copy_out(&self, words: &[u32]) {
        if self.shared.fault().is_some() {
            return;
        }
        let mut fe = self.frontend.lock();
        for scan in words.chunks_exact(self.channels) {
            if self.shared.is_satisfied() {
                break;
            }
            if !account(&self.shared, self.policy, fe.push_words(scan)) {
                break;
            }
        }
    }
}

/// Streams through a double-buffered DMA window.
#[derive(Debug, Default)]
pub(crate) struct DmaCapture {
    window: Option<Arc<DmaWindow>>,
    half_scans: usize,
}

impl CaptureStrategy for DmaCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ContinuousDma
    }

    fn check(&self, _requested: usize, device: &Device, has_dma: bool) -> Result<()> {
        if !has_dma {
            return Err(Error::UnsupportedStrategy(format!(
                "{} has no DMA engine",
                device.name()
            )));
        }
        Ok(())
    }

    fn arm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        let n = hw.plan.channel_count();
        self.half_scans = hw.config.dma_half_scans;
        let window = DmaWindow::shared(self.half_scans * n);
        self.window = Some(window.clone());

        let handler = DmaHandler {
            frontend: hw.frontend.clone(),
            shared: hw.shared.clone(),
            window: window.clone(),
            channels: n,
            policy: hw.config.overflow,
        };

        let requested = hw.shared.requested();
        {
            let dma = hw
                .dma
                .as_mut()
                .ok_or_else(|| Error::UnsupportedStrategy("no DMA engine".into()))?;
            sys_result(dma.register_callback(Box::new(move |ev| handler.on_event(ev))), ())?;
            if requested > 0 {
                sys_result(dma.stop_after(requested * n), ())?;
            }
        }
        {
            let mut fe = hw.frontend.lock();
            fe.device.configure_trigger_source(hw.trigger.kind())?;
            fe.device.set_conversion_mode(ConversionMode::Continuous)?;
        }
        if let Some(dma) = hw.dma.as_mut() {
            sys_result(dma.start(window), ())?;
        }
        debug!("DMA window armed: 2 x {} scans", self.half_scans);
        hw.trigger.arm()
    }

    fn service(&mut self, hw: &mut Hw<'_>) -> Result<Progress> {
        // The handler is the only writer of the fault slot.
        if self.window.as_ref().map_or(false, |w| w.overrun()) {
            return Err(Error::DmaOverrun);
        }
        hw.check_fault()?;

        let remaining = hw.shared.remaining();
        if remaining == 0 {
            Ok(Progress::Complete)
        }
        else if remaining < self.half_scans {
            Ok(Progress::Draining)
        }
        else {
            Ok(Progress::Pending)
        }
    }

    fn disarm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        let mut res = hw.trigger.disarm();
        if let Some(dma) = hw.dma.as_mut() {
            let stop = sys_result(dma.stop(), ());
            let clear = sys_result(dma.clear_callback(), ());
            res = res.and(stop).and(clear);
        }
        if let Some(window) = self.window.take() {
            if window.overrun() {
                warn!("DMA window overran during the session");
            }
            window.reset();
        }
        res
    }
}
