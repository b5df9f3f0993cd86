// iio-capture/src/strategy/burst.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Polled single-shot capture.

use converter_hal::{ConversionMode, TriggerKind};
use log::trace;

use super::{CaptureStrategy, Hw, Progress, StrategyKind};
use crate::Result;

/// Issues one conversion at a time and polls for its result.
#[derive(Debug, Default)]
pub(crate) struct BurstCapture;

impl CaptureStrategy for BurstCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Burst
    }

    fn arm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        let mut fe = hw.frontend.lock();
        fe.device.configure_trigger_source(TriggerKind::Software)?;
        fe.device.set_conversion_mode(ConversionMode::SingleShot)?;
        fe.device.start_conversion()
    }

    fn service(&mut self, hw: &mut Hw<'_>) -> Result<Progress> {
        if hw.shared.is_satisfied() {
            return Ok(Progress::Complete);
        }

        let frontend = hw.frontend;
        hw.supervisor
            .wait_until("conversion ready", || frontend.lock().device.conversion_ready())?;

        let mut fe = frontend.lock();
        fe.read_and_push(hw.plan.channel_count())?;
        hw.shared.add_delivered(1);
        trace!("burst scan {}/{}", hw.shared.delivered(), hw.shared.requested());

        if hw.shared.is_satisfied() {
            return Ok(Progress::Complete);
        }
        fe.device.start_conversion()?;
        Ok(Progress::Pending)
    }

    fn disarm(&mut self, _hw: &mut Hw<'_>) -> Result<()> {
        Ok(())
    }
}
