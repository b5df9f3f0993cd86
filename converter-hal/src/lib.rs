// converter-hal/src/lib.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Raw contracts between a converter acquisition pipeline and the firmware
//! around it.
//!
//! This crate holds no policy. It describes what the pipeline consumes from
//! the chip driver ([`ConverterDriver`]), from the platform's interrupt
//! sources ([`TriggerSource`]) and from a DMA peripheral ([`DmaEngine`]),
//! using the same conventions as C firmware drivers: every call returns a
//! [`Status`], where a negative value is `-errno` and a non-negative value is
//! success (or a count, where documented).
//!
//! The safe layer on top of these contracts lives in the `iio-capture`
//! crate.
//!

#![deny(missing_docs, missing_debug_implementations)]

pub mod dma;
pub mod driver;
pub mod trigger;

pub use crate::dma::*;
pub use crate::driver::*;
pub use crate::trigger::*;

/// Result code of a raw driver call.
///
/// Negative values are `-errno`. Zero is success. Some calls return a
/// positive count on success.
pub type Status = i32;

/// Errno values that converter drivers report.
///
/// These match the Linux values so that a driver ported from C can return
/// its codes unchanged.
pub mod errno {
    /// I/O error on the bus.
    pub const EIO: i32 = 5;
    /// The device or resource is busy.
    pub const EBUSY: i32 = 16;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
    /// No buffer space available.
    pub const ENOBUFS: i32 = 105;
    /// The operation timed out.
    pub const ETIMEDOUT: i32 = 110;
}

/// Conversion mode of the converter core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Powered, but not converting.
    Standby,
    /// One conversion per start command.
    SingleShot,
    /// Free-running conversions, paced by the device or a trigger.
    Continuous,
}

/// The hardware event that advances the converter to its next conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// A periodic timer or PWM edge.
    Timer,
    /// A GPIO "data ready" edge from the converter.
    DataReadyGpio,
    /// A conversion command issued by software.
    Software,
    /// The device FIFO reached its watermark.
    FifoWatermark,
}

/// How the converter codes a raw sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCoding {
    /// Straight binary, zero scale is all zeros.
    Unipolar,
    /// Bipolar, offset by half scale.
    OffsetBinary,
    /// Bipolar, two's complement.
    TwosComplement,
}

/// Bit layout of a raw word as the driver hands it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFormat {
    /// Number of valid data bits.
    pub bits: u8,
    /// Right shift to apply before the data bits are in place.
    pub shift: u8,
    /// The coding of the data bits.
    pub coding: RawCoding,
}

impl RawFormat {
    /// Creates a raw format with no shift.
    pub const fn new(bits: u8, coding: RawCoding) -> Self {
        Self { bits, shift: 0, coding }
    }

    /// Sets the right shift of the data bits.
    pub const fn with_shift(mut self, shift: u8) -> Self {
        self.shift = shift;
        self
    }
}
