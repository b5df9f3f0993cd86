// converter-hal/src/trigger.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Interrupt sources that pace the converter.

use crate::{Status, TriggerKind};

/// Completion callback, run in interrupt context once per trigger event.
///
/// It must not block.
pub type TriggerCallback = Box<dyn FnMut() + Send>;

/// A platform event source: a timer, a GPIO edge or a software command.
pub trait TriggerSource: Send {
    /// The kind of event this source produces.
    fn kind(&self) -> TriggerKind;

    /// Installs the completion callback, replacing any previous one.
    fn register_callback(&mut self, cb: TriggerCallback) -> Status;

    /// Removes the completion callback.
    fn clear_callback(&mut self) -> Status;

    /// Enables the event source.
    fn arm(&mut self) -> Status;

    /// Disables the event source. No callback runs after this returns.
    fn disarm(&mut self) -> Status;
}

impl<T: TriggerSource + ?Sized> TriggerSource for Box<T> {
    fn kind(&self) -> TriggerKind {
        (**self).kind()
    }

    fn register_callback(&mut self, cb: TriggerCallback) -> Status {
        (**self).register_callback(cb)
    }

    fn clear_callback(&mut self) -> Status {
        (**self).clear_callback()
    }

    fn arm(&mut self) -> Status {
        (**self).arm()
    }

    fn disarm(&mut self) -> Status {
        (**self).disarm()
    }
}
