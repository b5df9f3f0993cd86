// iio-capture/src/channel.rs
//
// Copyright (c) 2018-2019, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Converter channels and the sample codec.
//!
//! Every channel of a converter shares one [`DataFormat`]. It describes both
//! sides of the codec: the raw word as the driver hands it over (valid
//! bits, shift, coding) and the fixed-width, sign- and endian-normalized
//! sample written to the ring buffer.

use std::fmt;

use converter_hal::{RawCoding, RawFormat};

use crate::{Error, Result};

/// The format of a data sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFormat {
    bits: u8,
    storage_bits: u8,
    shift: u8,
    coding: RawCoding,
    big_endian: bool,
}

impl DataFormat {
    /// Creates the sample format for a driver's raw format.
    ///
    /// The storage width is the resolution rounded up to 8, 16 or 32 bits.
    pub fn from_raw(raw: RawFormat, big_endian: bool) -> Result<Self> {
        let storage_bits = match raw.bits {
            1..=8 => 8,
            9..=16 => 16,
            17..=32 => 32,
            n => return Err(Error::InvalidConfig(format!("unsupported resolution: {} bits", n))),
        };
        if u32::from(raw.shift) + u32::from(raw.bits) > 32 {
            return Err(Error::InvalidConfig(format!(
                "shift of {} leaves no room for {} data bits",
                raw.shift, raw.bits
            )));
        }
        Ok(Self {
            bits: raw.bits,
            storage_bits,
            shift: raw.shift,
            coding: raw.coding,
            big_endian,
        })
    }

    /// Gets total length of the sample, in bits.
    pub fn length(&self) -> u32 {
        u32::from(self.storage_bits)
    }

    /// Gets the length of valid data in the sample, in bits.
    pub fn bits(&self) -> u32 {
        u32::from(self.bits)
    }

    /// Right-shift applied to the raw word when converting the sample.
    pub fn shift(&self) -> u32 {
        u32::from(self.shift)
    }

    /// The coding of the raw word.
    pub fn coding(&self) -> RawCoding {
        self.coding
    }

    /// Determines if the sample is signed once on the wire
    pub fn is_signed(&self) -> bool {
        self.coding != RawCoding::Unipolar
    }

    /// Determines if the sample is written in big-endian format
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Sets the byte order of the on-wire sample.
    pub fn set_big_endian(&mut self, big_endian: bool) {
        self.big_endian = big_endian;
    }

    /// The number of bytes required to hold a single sample from the channel.
    pub fn byte_length(&self) -> usize {
        usize::from(self.storage_bits / 8)
    }

    fn data_mask(&self) -> u32 {
        if self.bits >= 32 {
            u32::MAX
        }
        else {
            (1u32 << self.bits) - 1
        }
    }

    // Sign-extends the low `bits` of the value to 32 bits.
    fn sign_extend(&self, val: u32) -> u32 {
        let pad = 32 - u32::from(self.bits);
        (((val << pad) as i32) >> pad) as u32
    }

    /// Normalizes a raw device word into its host value, before storage
    /// truncation.
    ///
    /// Offset-binary words are re-coded as two's complement.
    pub fn normalize(&self, raw: u32) -> u32 {
        let data = (raw >> self.shift) & self.data_mask();
        match self.coding {
            RawCoding::Unipolar => data,
            RawCoding::TwosComplement => self.sign_extend(data),
            RawCoding::OffsetBinary => self.sign_extend(data ^ (1u32 << (self.bits - 1))),
        }
    }

    /// Encodes one raw device word into `out`, which must be exactly
    /// [`byte_length()`](Self::byte_length) bytes long.
    pub fn encode(&self, raw: u32, out: &mut [u8]) {
        let n = self.byte_length();
        debug_assert_eq!(out.len(), n);
        let val = self.normalize(raw);
        if self.big_endian {
            out.copy_from_slice(&val.to_be_bytes()[4 - n..]);
        }
        else {
            out.copy_from_slice(&val.to_le_bytes()[..n]);
        }
    }

    /// Encodes one scan of raw words, appending the samples to `out` in the
    /// order of the words.
    pub fn encode_scan(&self, words: &[u32], out: &mut Vec<u8>) {
        let n = self.byte_length();
        let start = out.len();
        out.resize(start + n * words.len(), 0);
        for (word, chunk) in words.iter().zip(out[start..].chunks_exact_mut(n)) {
            self.encode(*word, chunk);
        }
    }

    /// Decodes one on-wire sample back into a host value.
    pub fn decode(&self, bytes: &[u8]) -> i64 {
        let n = self.byte_length();
        let mut buf = [0u8; 4];
        let val = if self.big_endian {
            buf[4 - n..].copy_from_slice(&bytes[..n]);
            u32::from_be_bytes(buf)
        }
        else {
            buf[..n].copy_from_slice(&bytes[..n]);
            u32::from_le_bytes(buf)
        };

        if self.is_signed() {
            let pad = 32 - self.length();
            i64::from(((val << pad) as i32) >> pad)
        }
        else {
            i64::from(val)
        }
    }
}

/// Shows the on-wire format the way IIO describes a scan element,
/// e.g. `le:s24/32>>0`.
impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}/{}>>0",
            if self.big_endian { "be" } else { "le" },
            if self.is_signed() { 's' } else { 'u' },
            self.bits,
            self.storage_bits
        )
    }
}

/// A converter input channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    index: u8,
    id: String,
    enabled: bool,
}

impl Channel {
    pub(crate) fn new(index: u8) -> Self {
        Self {
            index,
            id: format!("voltage{}", index),
            enabled: false,
        }
    }

    /// The index of the channel in the device sequencer
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Retrieve the channel ID (e.g. <b><i>voltage0</i></b>)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Determines if the channel is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(bits: u8, coding: RawCoding) -> DataFormat {
        DataFormat::from_raw(RawFormat::new(bits, coding), false).unwrap()
    }

    #[test]
    fn storage_rounds_up() {
        assert_eq!(fmt(8, RawCoding::Unipolar).byte_length(), 1);
        assert_eq!(fmt(12, RawCoding::Unipolar).byte_length(), 2);
        assert_eq!(fmt(16, RawCoding::Unipolar).byte_length(), 2);
        assert_eq!(fmt(18, RawCoding::Unipolar).byte_length(), 4);
        assert_eq!(fmt(24, RawCoding::TwosComplement).byte_length(), 4);
        assert!(DataFormat::from_raw(RawFormat::new(0, RawCoding::Unipolar), false).is_err());
        assert!(DataFormat::from_raw(RawFormat::new(33, RawCoding::Unipolar), false).is_err());
    }

    #[test]
    fn twos_complement_sign_extends() {
        let f = fmt(24, RawCoding::TwosComplement);
        let mut out = [0u8; 4];
        f.encode(0x00ff_fffe, &mut out);
        assert_eq!(out, [0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(f.decode(&out), -2);

        f.encode(0x0000_1234, &mut out);
        assert_eq!(out, [0x34, 0x12, 0x00, 0x00]);
        assert_eq!(f.decode(&out), 0x1234);
    }

    #[test]
    fn offset_binary_is_recoded() {
        let f = fmt(16, RawCoding::OffsetBinary);
        let mut out = [0u8; 2];

        f.encode(0x8000, &mut out);
        assert_eq!(f.decode(&out), 0);
        f.encode(0x0000, &mut out);
        assert_eq!(f.decode(&out), -32768);
        f.encode(0xffff, &mut out);
        assert_eq!(f.decode(&out), 32767);
    }

    #[test]
    fn shift_and_mask() {
        let raw = RawFormat::new(12, RawCoding::Unipolar).with_shift(4);
        let f = DataFormat::from_raw(raw, false).unwrap();
        let mut out = [0u8; 2];
        f.encode(0xf_abc5, &mut out);
        assert_eq!(f.decode(&out), 0xabc);
    }

    #[test]
    fn big_endian_output() {
        let mut f = fmt(24, RawCoding::Unipolar);
        f.set_big_endian(true);
        let mut out = [0u8; 4];
        f.encode(0x0012_3456, &mut out);
        assert_eq!(out, [0x00, 0x12, 0x34, 0x56]);
        assert_eq!(f.decode(&out), 0x12_3456);
        assert_eq!(f.to_string(), "be:u24/32>>0");
    }

    #[test]
    fn encode_scan_keeps_word_order() {
        let f = fmt(16, RawCoding::Unipolar);
        let mut out = vec![0xaa];
        f.encode_scan(&[0x0102, 0x0304], &mut out);
        assert_eq!(out, vec![0xaa, 0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn scan_type_string() {
        assert_eq!(fmt(24, RawCoding::TwosComplement).to_string(), "le:s24/32>>0");
        assert_eq!(fmt(12, RawCoding::Unipolar).to_string(), "le:u12/16>>0");
    }

    #[test]
    fn channel_ids() {
        let chan = Channel::new(3);
        assert_eq!(chan.id(), "voltage3");
        assert_eq!(chan.index(), 3);
        assert!(!chan.is_enabled());
    }
}
