// iio-capture/src/errors.rs
//
// Copyright (c) 2018-2025, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//!
//! Error definitions for the acquisition pipeline.

use nix::errno::Errno;
use thiserror::Error;

use crate::session::State;

/// The Error type for the acquisition pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// A set bit in the channel mask has no physical channel behind it.
    #[error("Invalid channel mask {mask:#x} for a device with {num_channels} channel(s)")]
    InvalidMask {
        /// The rejected mask
        mask: u32,
        /// The number of channels on the device
        num_channels: usize,
    },
    /// The selected capture strategy can't run on this hardware or request.
    #[error("Unsupported strategy: {0}")]
    UnsupportedStrategy(String),
    /// A sample count of zero ("until stopped") for a strategy that must
    /// terminate on its own.
    #[error("A finite sample count is required for this strategy")]
    UnboundedRequest,
    /// A configuration value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A capture profile could not be parsed.
    #[error("{0}")]
    Profile(#[from] toml::de::Error),
    /// Enabling or disabling a channel failed.
    #[error("Can't configure channel {channel}: {source}")]
    ChannelEnable {
        /// The index of the channel that failed
        channel: u8,
        /// The bus error reported by the driver
        #[source]
        source: Errno,
    },
    /// A register read or write failed.
    #[error("Bus error: {0}")]
    Bus(#[from] Errno),
    /// A bounded wait on the hardware ran out of polls.
    #[error("Timed out waiting for {0}")]
    TimedOut(&'static str),
    /// The ring buffer rejected a scan.
    #[error("Ring buffer full")]
    BufferFull,
    /// The DMA engine reached a window half that software still owned.
    #[error("DMA window overrun")]
    DmaOverrun,
    /// The size of a data or return value was different than expected.
    #[error("Bad return size")]
    BadReturnSize,
    /// A channel index did not find a channel
    #[error("Invalid index")]
    InvalidIndex,
    /// The operation is not allowed in the current state.
    #[error("Can't {op} while {state}")]
    InvalidState {
        /// The rejected operation
        op: &'static str,
        /// The state the pipeline was in
        state: State,
    },
}

/// The class of an error, as seen by the host protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected synchronously, before any streaming.
    Config,
    /// A register operation failed.
    Bus,
    /// The converter stalled.
    Timeout,
    /// The ring buffer overflowed.
    BufferFull,
}

impl Error {
    /// Gets the class of the error.
    pub fn class(&self) -> ErrorClass {
        use Error::*;
        match self {
            InvalidMask { .. }
            | UnsupportedStrategy(_)
            | UnboundedRequest
            | InvalidConfig(_)
            | Profile(_)
            | InvalidIndex
            | InvalidState { .. } => ErrorClass::Config,
            ChannelEnable { .. } | Bus(_) | BadReturnSize | DmaOverrun => ErrorClass::Bus,
            TimedOut(_) => ErrorClass::Timeout,
            BufferFull => ErrorClass::BufferFull,
        }
    }

    /// Gets the errno-style status reported to the host for this error.
    ///
    /// This is always negative.
    pub fn status(&self) -> i32 {
        use Error::*;
        let errno = match self {
            ChannelEnable { source, .. } => *source,
            Bus(err) => *err,
            TimedOut(_) => Errno::ETIMEDOUT,
            BufferFull => Errno::ENOBUFS,
            DmaOverrun => Errno::EOVERFLOW,
            BadReturnSize => Errno::EIO,
            _ => Errno::EINVAL,
        };
        -(errno as i32)
    }
}

/// The default result type for the acquisition pipeline
pub type Result<T> = std::result::Result<T, Error>;

// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_negative_errno() {
        assert_eq!(Error::TimedOut("ready").status(), -110);
        assert_eq!(Error::BufferFull.status(), -105);
        assert_eq!(Error::Bus(Errno::EIO).status(), -5);
        assert_eq!(Error::UnboundedRequest.status(), -22);

        let err = Error::ChannelEnable {
            channel: 3,
            source: Errno::EBUSY,
        };
        assert_eq!(err.status(), -16);
        assert_eq!(err.class(), ErrorClass::Bus);
    }

    #[test]
    fn classes() {
        let err = Error::InvalidMask {
            mask: 0x100,
            num_channels: 8,
        };
        assert_eq!(err.class(), ErrorClass::Config);
        assert_eq!(Error::TimedOut("fifo").class(), ErrorClass::Timeout);
        assert_eq!(Error::BufferFull.class(), ErrorClass::BufferFull);
        assert!(err.to_string().contains("0x100"));
    }
}
