// iio-capture/src/strategy/continuous.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Trigger-interrupt driven capture.

use std::{fmt, sync::Arc};

use converter_hal::ConversionMode;
use parking_lot::Mutex;

use super::{account, CaptureStrategy, Frontend, Hw, Progress, StrategyKind};
use crate::{session::SessionShared, OverflowPolicy, Result};

/// The sample-ready handler of a continuous session.
///
/// Each call reads one scan and writes it to the ring buffer. It is what
/// the trigger runs in interrupt context, and it can be called directly by
/// platforms that dispatch their own interrupts.
#[derive(Clone)]
pub struct ScanHandler {
    frontend: Arc<Mutex<Frontend>>,
    shared: Arc<SessionShared>,
    channels: usize,
    policy: OverflowPolicy,
}

impl ScanHandler {
    pub(crate) fn new(
        frontend: Arc<Mutex<Frontend>>,
        shared: Arc<SessionShared>,
        channels: usize,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            frontend,
            shared,
            channels,
            policy,
        }
    }

    /// Handles one trigger event.
    ///
    /// Nothing is read once the request is met or a fault was recorded.
    pub fn on_trigger(&self) {
        if self.shared.fault().is_some() || self.shared.is_satisfied() {
            return;
        }
        let res = self.frontend.lock().read_and_push(self.channels);
        account(&self.shared, self.policy, res);
    }

    /// The session state this handler updates.
    pub fn shared(&self) -> &SessionShared {
        &self.shared
    }
}

impl fmt::Debug for ScanHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanHandler")
            .field("channels", &self.channels)
            .field("policy", &self.policy)
            .field("shared", &self.shared)
            .finish()
    }
}

/// Reads one scan per trigger event from interrupt context.
#[derive(Debug, Default)]
pub(crate) struct ContinuousCapture;

impl CaptureStrategy for ContinuousCapture {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Continuous
    }

    fn arm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        {
            let mut fe = hw.frontend.lock();
            fe.device.configure_trigger_source(hw.trigger.kind())?;
            fe.device.set_conversion_mode(ConversionMode::Continuous)?;
        }
        let handler = ScanHandler::new(
            hw.frontend.clone(),
            hw.shared.clone(),
            hw.plan.channel_count(),
            hw.config.overflow,
        );
        hw.trigger.arm_with(Box::new(move || handler.on_trigger()))
    }

    fn service(&mut self, hw: &mut Hw<'_>) -> Result<Progress> {
        hw.check_fault()?;
        if hw.shared.is_satisfied() {
            Ok(Progress::Complete)
        }
        else {
            Ok(Progress::Pending)
        }
    }

    fn disarm(&mut self, hw: &mut Hw<'_>) -> Result<()> {
        hw.trigger.disarm()
    }
}
