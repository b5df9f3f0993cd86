// iio-capture/src/buffer.rs
//
// Copyright (c) 2018-2021, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The ring buffer sink.
//!
//! Captured scans end up in a bounded, single-producer/single-consumer byte
//! buffer shared with the host-facing transport. The pipeline is the only
//! writer; the transport drains it from the other end.
//!
//! Before each capture the usable capacity is rounded down to a whole
//! number of scans (see [`RingSink::align_to()`]), and every write is one
//! complete scan that either fits entirely or is rejected with
//! [`Error::BufferFull`]. Together this means the host never sees a partial
//! scan, at the cost of a few unused bytes at the end of the buffer.
//!
//! Alignment limits how much the buffer holds, not where the storage wraps.
//! A scan may straddle the end of the storage, so the transport only gets
//! copying reads through [`RingReader`], never slices of the storage.

use std::fmt;

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

use crate::{Error, Result};

/// The producer side of a bounded byte buffer.
pub trait RingSink: Send {
    /// The capacity of the underlying storage, in bytes.
    fn capacity(&self) -> usize;

    /// The number of bytes the pipeline may keep in the buffer.
    fn usable_capacity(&self) -> usize;

    /// Restricts the usable capacity to the largest multiple of
    /// `bytes_per_scan` not greater than [`capacity()`](Self::capacity).
    ///
    /// Returns the usable capacity, or an error if not even one scan fits.
    fn align_to(&mut self, bytes_per_scan: usize) -> Result<usize>;

    /// Writes one complete scan. This never blocks.
    ///
    /// Nothing is written if the whole of `bytes` does not fit.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<T: RingSink + ?Sized> RingSink for Box<T> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn usable_capacity(&self) -> usize {
        (**self).usable_capacity()
    }

    fn align_to(&mut self, bytes_per_scan: usize) -> Result<usize> {
        (**self).align_to(bytes_per_scan)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }
}

/// The pipeline's end of a heap-allocated SPSC ring buffer.
pub struct RingBuffer {
    prod: HeapProducer<u8>,
    usable: usize,
}

impl RingBuffer {
    /// Creates a ring buffer of `capacity` bytes.
    ///
    /// Returns the producer end, for the pipeline, and the reader end, for
    /// the transport.
    pub fn with_capacity(capacity: usize) -> Result<(RingBuffer, RingReader)> {
        if capacity == 0 {
            return Err(Error::InvalidConfig("ring buffer capacity must be non-zero".into()));
        }
        let (prod, cons) = HeapRb::<u8>::new(capacity).split();
        Ok((
            RingBuffer {
                prod,
                usable: capacity,
            },
            RingReader { cons },
        ))
    }

    /// The number of bytes waiting to be read.
    pub fn len(&self) -> usize {
        self.prod.len()
    }

    /// Determines if the buffer holds no data.
    pub fn is_empty(&self) -> bool {
        self.prod.is_empty()
    }
}

impl RingSink for RingBuffer {
    fn capacity(&self) -> usize {
        self.prod.capacity()
    }

    fn usable_capacity(&self) -> usize {
        self.usable
    }

    fn align_to(&mut self, bytes_per_scan: usize) -> Result<usize> {
        let cap = self.capacity();
        if bytes_per_scan == 0 || bytes_per_scan > cap {
            return Err(Error::InvalidConfig(format!(
                "a {} byte buffer can't hold a {} byte scan",
                cap, bytes_per_scan
            )));
        }
        self.usable = cap - cap % bytes_per_scan;
        Ok(self.usable)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        // The reader can only shrink `len()` under us, so the check holds.
        if self.prod.len() + bytes.len() > self.usable {
            return Err(Error::BufferFull);
        }
        let n = self.prod.push_slice(bytes);
        if n != bytes.len() {
            return Err(Error::BadReturnSize);
        }
        Ok(())
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.prod.capacity())
            .field("usable", &self.usable)
            .field("len", &self.prod.len())
            .finish()
    }
}

/// The transport's end of a [`RingBuffer`].
pub struct RingReader {
    cons: HeapConsumer<u8>,
}

impl RingReader {
    /// The number of bytes waiting to be read.
    pub fn len(&self) -> usize {
        self.cons.len()
    }

    /// Determines if there's nothing to read.
    pub fn is_empty(&self) -> bool {
        self.cons.is_empty()
    }

    /// Reads as many bytes as are available, up to the size of `buf`.
    ///
    /// Returns the number of bytes read.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        self.cons.pop_slice(buf)
    }

    /// Reads everything currently in the buffer.
    pub fn read_all(&mut self) -> Vec<u8> {
        self.cons.pop_iter().collect()
    }

    /// Reads up to `max_scans` whole scans of `bytes_per_scan` bytes.
    pub fn read_scans(&mut self, bytes_per_scan: usize, max_scans: usize) -> Vec<u8> {
        if bytes_per_scan == 0 {
            return Vec::new();
        }
        let n = (self.cons.len() / bytes_per_scan).min(max_scans);
        let mut buf = vec![0u8; n * bytes_per_scan];
        let got = self.cons.pop_slice(&mut buf);
        buf.truncate(got);
        buf
    }
}

impl fmt::Debug for RingReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("len", &self.cons.len())
            .finish()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
