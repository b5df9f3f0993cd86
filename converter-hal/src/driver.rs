// converter-hal/src/driver.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The chip driver contract.

use crate::{ConversionMode, RawFormat, Status, TriggerKind};

/// The operations an acquisition pipeline needs from a converter driver.
///
/// Register maps, calibration and bring-up stay behind this trait. All
/// calls are made from the main loop, except [`read_one_scan()`] which the
/// interrupt-driven strategies also call from the trigger handler.
///
/// [`read_one_scan()`]: ConverterDriver::read_one_scan
pub trait ConverterDriver: Send {
    /// The name of the device (e.g. `ad7124-8`).
    fn name(&self) -> &str;

    /// The number of physical input channels.
    fn num_channels(&self) -> usize;

    /// The layout of a raw sample word.
    fn raw_format(&self) -> RawFormat;

    /// Enables or disables a single channel in the device sequencer.
    fn set_channel_enable(&mut self, channel: u8, enable: bool) -> Status;

    /// Switches the converter core between standby, single-shot and
    /// continuous conversion.
    fn set_conversion_mode(&mut self, mode: ConversionMode) -> Status;

    /// Issues one conversion command (single-shot mode).
    fn start_conversion(&mut self) -> Status;

    /// Polls the "conversion ready" flag.
    ///
    /// Returns 1 when a scan is ready, 0 when not, or `-errno`.
    fn conversion_ready(&mut self) -> Status;

    /// Reads one multi-channel scan of the enabled channels, in ascending
    /// channel order, into `out`.
    ///
    /// Returns the number of words written, or `-errno`.
    fn read_one_scan(&mut self, out: &mut [u32]) -> Status;

    /// The depth of the hardware FIFO, in scans. Zero if the device has no
    /// FIFO.
    fn fifo_depth(&self) -> usize {
        0
    }

    /// Sets the FIFO level, in scans, at which the "batch ready" signal
    /// fires.
    fn configure_fifo_watermark(&mut self, _count: u16) -> Status {
        -crate::errno::EINVAL
    }

    /// Gets the number of complete scans waiting in the FIFO, or `-errno`.
    fn fifo_level(&mut self) -> Status {
        -crate::errno::EINVAL
    }

    /// Drains whole scans from the FIFO into `out` in one bus transaction.
    ///
    /// `out.len()` is a multiple of the enabled channel count. Returns the
    /// number of words written, or `-errno`.
    fn read_fifo_batch(&mut self, _out: &mut [u32]) -> Status {
        -crate::errno::EINVAL
    }

    /// Selects which hardware event paces conversions.
    fn configure_trigger_source(&mut self, kind: TriggerKind) -> Status;
}

impl<T: ConverterDriver + ?Sized> ConverterDriver for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn num_channels(&self) -> usize {
        (**self).num_channels()
    }

    fn raw_format(&self) -> RawFormat {
        (**self).raw_format()
    }

    fn set_channel_enable(&mut self, channel: u8, enable: bool) -> Status {
        (**self).set_channel_enable(channel, enable)
    }

    fn set_conversion_mode(&mut self, mode: ConversionMode) -> Status {
        (**self).set_conversion_mode(mode)
    }

    fn start_conversion(&mut self) -> Status {
        (**self).start_conversion()
    }

    fn conversion_ready(&mut self) -> Status {
        (**self).conversion_ready()
    }

    fn read_one_scan(&mut self, out: &mut [u32]) -> Status {
        (**self).read_one_scan(out)
    }

    fn fifo_depth(&self) -> usize {
        (**self).fifo_depth()
    }

    fn configure_fifo_watermark(&mut self, count: u16) -> Status {
        (**self).configure_fifo_watermark(count)
    }

    fn fifo_level(&mut self) -> Status {
        (**self).fifo_level()
    }

    fn read_fifo_batch(&mut self, out: &mut [u32]) -> Status {
        (**self).read_fifo_batch(out)
    }

    fn configure_trigger_source(&mut self, kind: TriggerKind) -> Status {
        (**self).configure_trigger_source(kind)
    }
}
