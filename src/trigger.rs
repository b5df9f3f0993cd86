// iio-capture/src/trigger.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Trigger sources.
//!
//! A [`Trigger`] wraps whatever hardware event advances the converter: a
//! periodic timer edge, a GPIO "data ready" edge or a software command.
//! Interrupt-driven strategies hand it a completion callback when arming.

use std::fmt;

use converter_hal::{TriggerCallback, TriggerKind, TriggerSource};
use log::debug;

use crate::{sys_result, Result};

/// An event source that paces the converter.
pub struct Trigger {
    src: Box<dyn TriggerSource>,
    armed: bool,
}

impl Trigger {
    /// Wraps a platform event source.
    pub fn new<T>(src: T) -> Self
    where
        T: TriggerSource + 'static,
    {
        Self {
            src: Box::new(src),
            armed: false,
        }
    }

    /// The kind of event this trigger produces.
    pub fn kind(&self) -> TriggerKind {
        self.src.kind()
    }

    /// Determines if the trigger is armed.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Enables the trigger without a callback.
    pub fn arm(&mut self) -> Result<()> {
        let ret = self.src.arm();
        sys_result(ret, ())?;
        self.armed = true;
        debug!("{:?} trigger armed", self.kind());
        Ok(())
    }

    /// Installs `cb` and enables the trigger.
    ///
    /// The callback runs in interrupt context, once per event.
    pub fn arm_with(&mut self, cb: TriggerCallback) -> Result<()> {
        let ret = self.src.register_callback(cb);
        sys_result(ret, ())?;
        self.arm()
    }

    /// Disables the trigger and removes its callback.
    ///
    /// Both steps are attempted; the first failure is returned. The trigger
    /// is considered disarmed either way.
    pub fn disarm(&mut self) -> Result<()> {
        let res = sys_result(self.src.disarm(), ());
        let clear = sys_result(self.src.clear_callback(), ());
        self.armed = false;
        debug!("{:?} trigger disarmed", self.kind());
        res.and(clear)
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("kind", &self.kind())
            .field("armed", &self.armed)
            .finish()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dummy::DummyTrigger, Error};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn callback_runs_only_while_armed() {
        let src = DummyTrigger::new(TriggerKind::Timer);
        let handle = src.handle();
        let mut trig = Trigger::new(src);

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        trig.arm_with(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        assert!(trig.is_armed());

        assert_eq!(handle.fire_n(3), 3);
        trig.disarm().unwrap();
        assert!(!handle.fire());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failed_disarm_still_disarms() {
        let src = DummyTrigger::new(TriggerKind::DataReadyGpio);
        let handle = src.handle();
        let mut trig = Trigger::new(src);
        trig.arm().unwrap();

        handle.fail_disarm(true);
        assert!(matches!(trig.disarm(), Err(Error::Bus(_))));
        assert!(!trig.is_armed());
    }
}
