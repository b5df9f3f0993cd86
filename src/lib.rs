// iio-capture/src/lib.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//!
//! Sampled-data acquisition pipeline for converter (ADC) firmware.
//!
//! This crate sits between a converter driver and the host-facing transport
//! of an IIO-style attribute/channel server. It arms a conversion source,
//! collects multi-channel scans at device rate and feeds them into a bounded
//! ring buffer that the transport drains.
//!
//! The pieces, leaves first:
//!
//! - [`ChannelMask`] / [`ScanPlan`]: which channels are captured, in which
//!   order, and how many bytes one scan takes.
//! - [`DataFormat`]: the sample codec that normalizes a raw device word
//!   into its on-wire representation.
//! - [`RingBuffer`]: the bounded single-producer byte sink.
//! - [`Trigger`]: the event source that advances the converter.
//! - [`Supervisor`]: bounded waits on hardware flags.
//! - [`Pipeline`]: the capture state machine running one of the
//!   [`StrategyKind`]s against one converter.
//!
//! Hardware is reached through the raw contracts of the `converter-hal`
//! crate. The [`dummy`] module provides a software converter for tests and
//! the utilities.
//!

// Lints
#![deny(
    missing_docs,
    missing_debug_implementations,
    unstable_features,
    unused_import_braces
)]

use converter_hal::Status;
use nix::errno::Errno;

pub use converter_hal as hal;

pub use crate::buffer::*;
pub use crate::channel::*;
pub use crate::config::*;
pub use crate::device::*;
pub use crate::errors::*;
pub use crate::pipeline::*;
pub use crate::scan::*;
pub use crate::session::*;
pub use crate::strategy::{Progress, ScanHandler, StrategyKind};
pub use crate::timeout::*;
pub use crate::trigger::*;

pub mod buffer;
pub mod channel;
pub mod config;
pub mod device;
pub mod dummy;
pub mod errors;
pub mod pipeline;
pub mod scan;
pub mod session;
pub mod strategy;
pub mod timeout;
pub mod trigger;

// --------------------------------------------------------------------------

/// Converts a raw driver status into a result.
///
/// Negative values are `-errno` and become [`Error::Bus`]. Anything else is
/// success, carrying `result`.
pub(crate) fn sys_result<T>(ret: Status, result: T) -> Result<T> {
    if ret < 0 {
        Err(Errno::from_i32(-ret).into())
    }
    else {
        Ok(result)
    }
}

// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sys_result_maps_negative_errno() {
        assert_eq!(sys_result(0, 7).unwrap(), 7);
        assert!(sys_result(12, ()).is_ok());

        match sys_result(-hal::errno::EIO, ()) {
            Err(Error::Bus(Errno::EIO)) => (),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
