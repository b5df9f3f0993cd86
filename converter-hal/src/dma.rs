// converter-hal/src/dma.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Double-buffered DMA destination memory and the DMA engine contract.
//!
//! A [`DmaWindow`] is one destination buffer split in two halves. The DMA
//! engine fills one half while software copies the other one out. Each half
//! is owned by exactly one side at a time:
//!
//! ```text
//!   Hardware ──fill + release_to_software()──> Software
//!      ▲                                          │
//!      └──────────── release_to_hardware() ───────┘
//! ```
//!
//! If the engine reaches a half boundary while software still owns the half
//! it is about to write, the copy-out missed its deadline. The engine must
//! not write the half; it latches the overrun flag instead.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use crate::Status;

/// The side that currently owns one half of a [`DmaWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfOwner {
    /// The DMA engine is (or may be) writing the half.
    Hardware,
    /// Software is copying the half out.
    Software,
}

/// A completion signal from the DMA engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaEvent {
    /// The first half was filled and handed to software.
    HalfComplete,
    /// The second half was filled and handed to software.
    FullComplete,
    /// The stop timer halted the engine inside a half. `words` words of
    /// that half are valid and it was handed to software.
    Halted {
        /// Index of the partially filled half (0 or 1).
        half: usize,
        /// Number of valid words in the half.
        words: usize,
    },
}

impl DmaEvent {
    /// The index of the half this event hands to software.
    pub fn half(&self) -> usize {
        match *self {
            DmaEvent::HalfComplete => 0,
            DmaEvent::FullComplete => 1,
            DmaEvent::Halted { half, .. } => half,
        }
    }
}

/// DMA completion callback, run in interrupt context.
pub type DmaCallback = Box<dyn FnMut(DmaEvent) + Send>;

/// Two-half destination buffer shared by a DMA engine and software.
pub struct DmaWindow {
    half_words: usize,
    halves: [Mutex<Vec<u32>>; 2],
    // true when software owns the half
    software: [AtomicBool; 2],
    overrun: AtomicBool,
}

impl DmaWindow {
    /// Creates a window with `half_words` words in each half. Both halves
    /// start out owned by the hardware.
    pub fn new(half_words: usize) -> Self {
        Self {
            half_words,
            halves: [
                Mutex::new(vec![0; half_words]),
                Mutex::new(vec![0; half_words]),
            ],
            software: [AtomicBool::new(false), AtomicBool::new(false)],
            overrun: AtomicBool::new(false),
        }
    }

    /// Creates a shared window.
    pub fn shared(half_words: usize) -> Arc<Self> {
        Arc::new(Self::new(half_words))
    }

    /// The number of words in each half.
    pub fn half_words(&self) -> usize {
        self.half_words
    }

    /// The total number of words in the window.
    pub fn len(&self) -> usize {
        2 * self.half_words
    }

    /// Determines if the window has no storage at all.
    pub fn is_empty(&self) -> bool {
        self.half_words == 0
    }

    /// Gets the current owner of a half.
    pub fn owner(&self, half: usize) -> HalfOwner {
        if self.software[half & 1].load(Ordering::Acquire) {
            HalfOwner::Software
        }
        else {
            HalfOwner::Hardware
        }
    }

    /// Hardware side: writes into a half it owns.
    ///
    /// Returns `false` without touching the memory, and latches the overrun
    /// flag, if software still owns the half.
    pub fn fill<F>(&self, half: usize, f: F) -> bool
    where
        F: FnOnce(&mut [u32]),
    {
        let half = half & 1;
        if self.owner(half) == HalfOwner::Software {
            self.overrun.store(true, Ordering::Release);
            return false;
        }
        let mut mem = self.halves[half].lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut mem);
        true
    }

    /// Hardware side: hands a filled half to software.
    pub fn release_to_software(&self, half: usize) {
        self.software[half & 1].store(true, Ordering::Release);
    }

    /// Software side: reads a half that software owns.
    ///
    /// Returns `None` if the hardware owns the half.
    pub fn read<F, R>(&self, half: usize, f: F) -> Option<R>
    where
        F: FnOnce(&[u32]) -> R,
    {
        let half = half & 1;
        if self.owner(half) == HalfOwner::Hardware {
            return None;
        }
        let mem = self.halves[half].lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mem))
    }

    /// Software side: hands a copied-out half back to the hardware.
    pub fn release_to_hardware(&self, half: usize) {
        self.software[half & 1].store(false, Ordering::Release);
    }

    /// Determines if the engine ever found software still owning the half
    /// it needed to write.
    pub fn overrun(&self) -> bool {
        self.overrun.load(Ordering::Acquire)
    }

    /// Returns both halves to the hardware and clears the overrun latch.
    pub fn reset(&self) {
        for owner in &self.software {
            owner.store(false, Ordering::Release);
        }
        self.overrun.store(false, Ordering::Release);
    }
}

impl fmt::Debug for DmaWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaWindow")
            .field("half_words", &self.half_words)
            .field("owners", &[self.owner(0), self.owner(1)])
            .field("overrun", &self.overrun())
            .finish()
    }
}

/// A circular DMA engine moving converter words into a [`DmaWindow`].
pub trait DmaEngine: Send {
    /// Installs the half/full completion callback.
    fn register_callback(&mut self, cb: DmaCallback) -> Status;

    /// Removes the completion callback.
    fn clear_callback(&mut self) -> Status;

    /// Starts circular transfers into `window`, first half first.
    fn start(&mut self, window: Arc<DmaWindow>) -> Status;

    /// Programs the stop timer: the engine halts after `words` more words
    /// have been transferred, raising [`DmaEvent::Halted`] if that point
    /// falls inside a half rather than on a half boundary.
    fn stop_after(&mut self, words: usize) -> Status;

    /// Halts the engine immediately. No callback runs after this returns.
    fn stop(&mut self) -> Status;
}

impl<T: DmaEngine + ?Sized> DmaEngine for Box<T> {
    fn register_callback(&mut self, cb: DmaCallback) -> Status {
        (**self).register_callback(cb)
    }

    fn clear_callback(&mut self) -> Status {
        (**self).clear_callback()
    }

    fn start(&mut self, window: Arc<DmaWindow>) -> Status {
        (**self).start(window)
    }

    fn stop_after(&mut self, words: usize) -> Status {
        (**self).stop_after(words)
    }

    fn stop(&mut self) -> Status {
        (**self).stop()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------
