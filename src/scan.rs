// iio-capture/src/scan.rs
//
// Copyright (c) 2023, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//

//! Scan planning: from a channel-enable mask to the layout of one scan.

use std::{fmt, str::FromStr};

use crate::{DataFormat, Error, Result};

/// The largest number of channels a mask can describe.
pub const MAX_CHANNELS: usize = 32;

/// A set of device channels, one bit per channel index.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelMask(u32);

impl ChannelMask {
    /// A mask with no channels.
    pub const NONE: ChannelMask = ChannelMask(0);

    /// Creates a mask from its raw bits.
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Creates a mask from a list of channel indices.
    pub fn from_channels(channels: &[u8]) -> Result<Self> {
        let mut bits = 0u32;
        for &ch in channels {
            if usize::from(ch) >= MAX_CHANNELS {
                return Err(Error::InvalidIndex);
            }
            bits |= 1 << ch;
        }
        Ok(Self(bits))
    }

    /// Creates a mask covering the first `n` channels.
    pub fn first(n: usize) -> Self {
        if n >= MAX_CHANNELS {
            Self(u32::MAX)
        }
        else {
            Self((1u32 << n) - 1)
        }
    }

    /// Gets the raw bits of the mask.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Determines if no channel is set.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Gets the number of channels in the mask.
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Determines if the channel is in the mask.
    pub fn contains(&self, channel: u8) -> bool {
        usize::from(channel) < MAX_CHANNELS && self.0 & (1 << channel) != 0
    }

    /// Checks that every set bit names a channel of a device with
    /// `num_channels` channels.
    pub fn validate(&self, num_channels: usize) -> Result<()> {
        if self.0 & !Self::first(num_channels).0 != 0 {
            return Err(Error::InvalidMask {
                mask: self.0,
                num_channels,
            });
        }
        Ok(())
    }

    /// Gets an iterator over the channels in the mask, lowest index first.
    pub fn iter(&self) -> ChannelIter {
        ChannelIter { bits: self.0 }
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#b})", self.0)
    }
}

/// Parses a mask from a list of channels ("0,2,5") or hex bits ("0x25").
impl FromStr for ChannelMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || Error::InvalidConfig(format!("bad channel mask '{}'", s));

        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16).map(Self).map_err(|_| bad());
        }
        let chans = s
            .split(',')
            .map(|ch| ch.trim().parse::<u8>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| bad())?;
        Self::from_channels(&chans)
    }
}

impl From<u32> for ChannelMask {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl IntoIterator for ChannelMask {
    type Item = u8;
    type IntoIter = ChannelIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the channels of a [`ChannelMask`], in ascending order.
#[derive(Debug, Clone)]
pub struct ChannelIter {
    bits: u32,
}

impl Iterator for ChannelIter {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.bits == 0 {
            return None;
        }
        let ch = self.bits.trailing_zeros() as u8;
        self.bits &= self.bits - 1;
        Some(ch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.bits.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChannelIter {}

/// The layout of one multi-channel scan for an acquisition.
///
/// Samples of the active channels are interleaved in ascending channel
/// order in every scan. A plan is computed when a capture is prepared and
/// does not change until the capture ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    mask: ChannelMask,
    active: Vec<u8>,
    sample_bytes: usize,
}

impl ScanPlan {
    /// Plans a scan of the channels in `mask` for a device with
    /// `num_channels` channels sampling in `format`.
    pub fn new(mask: ChannelMask, num_channels: usize, format: &DataFormat) -> Result<Self> {
        mask.validate(num_channels)?;
        Ok(Self {
            mask,
            active: mask.iter().collect(),
            sample_bytes: format.byte_length(),
        })
    }

    /// The mask this plan was made from.
    pub fn mask(&self) -> ChannelMask {
        self.mask
    }

    /// The active channels, in the order their samples appear in a scan.
    pub fn active_channels(&self) -> &[u8] {
        &self.active
    }

    /// The number of active channels.
    pub fn channel_count(&self) -> usize {
        self.active.len()
    }

    /// The size of one sample, in bytes.
    pub fn sample_bytes(&self) -> usize {
        self.sample_bytes
    }

    /// The byte stride of one scan in the output buffer.
    pub fn bytes_per_scan(&self) -> usize {
        self.active.len() * self.sample_bytes
    }

    /// The byte offset of a channel's sample within a scan, if the channel
    /// is active.
    pub fn offset_of(&self, channel: u8) -> Option<usize> {
        self.active
            .iter()
            .position(|&ch| ch == channel)
            .map(|pos| pos * self.sample_bytes)
    }

    /// The largest multiple of the scan size that fits in `capacity` bytes.
    pub fn aligned_capacity(&self, capacity: usize) -> usize {
        match self.bytes_per_scan() {
            0 => 0,
            n => capacity - capacity % n,
        }
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
