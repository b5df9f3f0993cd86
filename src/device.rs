// iio-capture/src/device.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Converter devices.
//!

use std::fmt;

use converter_hal::{ConversionMode, ConverterDriver, TriggerKind};
use log::{debug, warn};

use crate::{sys_result, Channel, ChannelMask, DataFormat, Error, Result, ScanPlan, MAX_CHANNELS};

/// A converter device.
///
/// This wraps a raw [`ConverterDriver`], turning its status codes into
/// errors and keeping track of the channel table.
pub struct Device {
    drv: Box<dyn ConverterDriver>,
    format: DataFormat,
    channels: Vec<Channel>,
}

impl Device {
    /// Creates a device over a driver, writing little-endian samples.
    pub fn new<D>(drv: D) -> Result<Self>
    where
        D: ConverterDriver + 'static,
    {
        Self::from_boxed(Box::new(drv))
    }

    /// Creates a device over a boxed driver.
    pub fn from_boxed(drv: Box<dyn ConverterDriver>) -> Result<Self> {
        let n = drv.num_channels();
        if n == 0 || n > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "{}: unsupported channel count {}",
                drv.name(),
                n
            )));
        }
        let format = DataFormat::from_raw(drv.raw_format(), false)?;
        let channels = (0..n as u8).map(Channel::new).collect();
        Ok(Self {
            drv,
            format,
            channels,
        })
    }

    /// Gets the name of the device
    pub fn name(&self) -> &str {
        self.drv.name()
    }

    /// Gets the number of channels on the device
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Gets the sample format shared by all channels
    pub fn format(&self) -> &DataFormat {
        &self.format
    }

    pub(crate) fn set_big_endian(&mut self, big_endian: bool) {
        self.format.set_big_endian(big_endian);
    }

    /// Gets a channel by index
    pub fn get_channel(&self, idx: usize) -> Result<&Channel> {
        self.channels.get(idx).ok_or(Error::InvalidIndex)
    }

    /// Try to find a channel by its ID (e.g. `voltage3`)
    pub fn find_channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|chan| chan.id() == id)
    }

    /// Gets an iterator for all the channels in the device
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Gets the mask of the channels currently enabled
    pub fn enabled_mask(&self) -> ChannelMask {
        self.channels
            .iter()
            .filter(|chan| chan.is_enabled())
            .fold(ChannelMask::NONE, |mask, chan| {
                ChannelMask::new(mask.bits() | 1 << chan.index())
            })
    }

    /// Plans a scan of the channels in `mask`.
    pub fn plan(&self, mask: ChannelMask) -> Result<ScanPlan> {
        ScanPlan::new(mask, self.num_channels(), &self.format)
    }

    /// Enables the channels in `mask` and disables all the others.
    ///
    /// One register operation is made per channel. The first failure stops
    /// the sequence and reports the channel index.
    pub fn apply_mask(&mut self, mask: ChannelMask) -> Result<()> {
        mask.validate(self.num_channels())?;
        for chan in self.channels.iter_mut() {
            let idx = chan.index();
            let on = mask.contains(idx);
            let ret = self.drv.set_channel_enable(idx, on);
            if ret < 0 {
                return Err(Error::ChannelEnable {
                    channel: idx,
                    source: nix::errno::Errno::from_i32(-ret),
                });
            }
            chan.set_enabled(on);
        }
        debug!("{}: enabled channels {:?}", self.name(), mask);
        Ok(())
    }

    /// Disables every channel, carrying on past failures.
    ///
    /// Returns the first failure, if any.
    pub fn disable_all(&mut self) -> Result<()> {
        let mut res = Ok(());
        for chan in self.channels.iter_mut() {
            let idx = chan.index();
            let ret = self.drv.set_channel_enable(idx, false);
            if ret < 0 {
                let source = nix::errno::Errno::from_i32(-ret);
                warn!("{}: can't disable channel {}: {}", self.drv.name(), idx, source);
                if res.is_ok() {
                    res = Err(Error::ChannelEnable {
                        channel: idx,
                        source,
                    });
                }
            }
            else {
                chan.set_enabled(false);
            }
        }
        res
    }

    /// Sets the conversion mode of the converter core.
    pub fn set_conversion_mode(&mut self, mode: ConversionMode) -> Result<()> {
        let ret = self.drv.set_conversion_mode(mode);
        sys_result(ret, ())
    }

    /// Selects the hardware event that paces conversions.
    pub fn configure_trigger_source(&mut self, kind: TriggerKind) -> Result<()> {
        let ret = self.drv.configure_trigger_source(kind);
        sys_result(ret, ())
    }

    /// Issues one conversion command.
    pub fn start_conversion(&mut self) -> Result<()> {
        let ret = self.drv.start_conversion();
        sys_result(ret, ())
    }

    /// Determines if a conversion result is ready.
    pub fn conversion_ready(&mut self) -> Result<bool> {
        let ret = self.drv.conversion_ready();
        sys_result(ret, ret > 0)
    }

    /// Reads one scan of the enabled channels into `out`.
    ///
    /// `out` must be exactly one word per enabled channel; anything else is
    /// reported as [`Error::BadReturnSize`].
    pub fn read_one_scan(&mut self, out: &mut [u32]) -> Result<()> {
        let ret = self.drv.read_one_scan(out);
        let n = sys_result(ret, ret as usize)?;
        if n != out.len() {
            return Err(Error::BadReturnSize);
        }
        Ok(())
    }

    /// The depth of the hardware FIFO in scans, or zero without a FIFO.
    pub fn fifo_depth(&self) -> usize {
        self.drv.fifo_depth()
    }

    /// Sets the FIFO watermark, in scans.
    pub fn configure_fifo_watermark(&mut self, scans: usize) -> Result<()> {
        let count = u16::try_from(scans)
            .map_err(|_| Error::InvalidConfig(format!("FIFO watermark too large: {}", scans)))?;
        let ret = self.drv.configure_fifo_watermark(count);
        sys_result(ret, ())
    }

    /// Gets the number of scans waiting in the FIFO.
    pub fn fifo_level(&mut self) -> Result<usize> {
        let ret = self.drv.fifo_level();
        sys_result(ret, ret as usize)
    }

    /// Drains whole scans from the FIFO in one transaction.
    ///
    /// Returns the number of words read.
    pub fn read_fifo_batch(&mut self, out: &mut [u32]) -> Result<usize> {
        let ret = self.drv.read_fifo_batch(out);
        let n = sys_result(ret, ret as usize)?;
        if n > out.len() {
            return Err(Error::BadReturnSize); // This should never happen.
        }
        Ok(n)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .field("format", &self.format)
            .field("channels", &self.channels)
            .finish()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::DummyConverter;
    use converter_hal::{RawCoding, RawFormat};

    fn dummy() -> (Device, crate::dummy::DummyHandle) {
        let conv = DummyConverter::new("dummy", 8, RawFormat::new(24, RawCoding::TwosComplement));
        let handle = conv.handle();
        (Device::new(conv).unwrap(), handle)
    }

    #[test]
    fn channel_table() {
        let (dev, _) = dummy();
        assert_eq!(dev.name(), "dummy");
        assert_eq!(dev.num_channels(), 8);
        assert_eq!(dev.format().byte_length(), 4);
        assert_eq!(dev.find_channel("voltage7").map(|c| c.index()), Some(7));
        assert!(dev.find_channel("voltage8").is_none());
        assert!(dev.get_channel(8).is_err());
    }

    #[test]
    fn apply_mask_enables_exactly_the_mask() {
        let (mut dev, handle) = dummy();
        dev.apply_mask(ChannelMask::new(0b101)).unwrap();
        assert_eq!(dev.enabled_mask(), ChannelMask::new(0b101));
        assert_eq!(handle.enabled_mask(), 0b101);

        dev.apply_mask(ChannelMask::new(0b10)).unwrap();
        assert_eq!(handle.enabled_mask(), 0b10);
    }

    #[test]
    fn enable_failure_names_the_channel() {
        let (mut dev, handle) = dummy();
        handle.fail_enable_on(2);
        match dev.apply_mask(ChannelMask::new(0b111)) {
            Err(Error::ChannelEnable { channel: 2, .. }) => (),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(handle.enabled_mask(), 0b011);

        assert!(dev.disable_all().is_err());
        assert_eq!(handle.enabled_mask(), 0);
    }

    #[test]
    fn short_read_is_an_error() {
        let (mut dev, _) = dummy();
        dev.apply_mask(ChannelMask::new(0b11)).unwrap();
        let mut words = [0u32; 3];
        assert!(matches!(dev.read_one_scan(&mut words), Err(Error::BadReturnSize)));
        assert!(dev.read_one_scan(&mut words[..2]).is_ok());
    }
}
