// iio-capture/src/dummy.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Simulated hardware.
//!
//! A converter, trigger and DMA engine that run entirely in memory, for
//! tests, demos and bring-up on a host. Each one hands out a cloneable
//! handle that can inspect it and inject faults while a pipeline owns it.
//!
//! The converter produces a deterministic pattern: the sample of channel
//! `ch` in scan `seq` is [`sample_value(ch, seq)`](sample_value), so any
//! captured byte stream can be checked against what was requested.

use std::{collections::VecDeque, fmt, sync::Arc};

use converter_hal::{
    errno, ConversionMode, ConverterDriver, DmaCallback, DmaEngine, DmaEvent, DmaWindow,
    RawCoding, RawFormat, Status, TriggerCallback, TriggerKind, TriggerSource,
};
use parking_lot::Mutex;

/// The value the dummy converter produces for `channel` in scan `seq`.
pub fn sample_value(channel: u8, seq: u32) -> u32 {
    seq.wrapping_mul(16).wrapping_add(u32::from(channel))
}

/// Converts a host value into the raw word a converter with `format`
/// would report.
pub fn to_raw(format: RawFormat, value: u32) -> u32 {
    let mask = if format.bits >= 32 {
        u32::MAX
    }
    else {
        (1u32 << format.bits) - 1
    };
    let data = match format.coding {
        RawCoding::OffsetBinary => (value ^ (1u32 << (format.bits - 1))) & mask,
        _ => value & mask,
    };
    data << format.shift
}

// --------------------------------------------------------------------------

struct ConverterState {
    format: RawFormat,
    num_channels: usize,
    fifo_depth: usize,
    enabled: u32,
    mode: ConversionMode,
    modes: Vec<ConversionMode>,
    trigger: Option<TriggerKind>,
    seq: u32,
    pending: bool,
    ready_delay: u32,
    ready_polls: u32,
    watermark: u16,
    fifo_level: usize,
    fifo_fill: usize,
    batches: Vec<usize>,
    reads: usize,
    fail_enable: Option<u8>,
    fail_read_after: Option<usize>,
    fail_standby: bool,
    stall_ready: bool,
    stall_fifo: bool,
}

impl ConverterState {
    fn enabled_count(&self) -> usize {
        self.enabled.count_ones() as usize
    }

    fn read_allowed(&mut self) -> bool {
        if self.fail_read_after.map_or(false, |n| self.reads >= n) {
            return false;
        }
        self.reads += 1;
        true
    }

    // Fills `out` with whole scans of the enabled channels.
    fn generate(&mut self, out: &mut [u32]) {
        let n = self.enabled_count();
        if n == 0 {
            return;
        }
        let channels: Vec<u8> = (0..32u8).filter(|ch| self.enabled & (1 << ch) != 0).collect();
        for scan in out.chunks_exact_mut(n) {
            for (word, &ch) in scan.iter_mut().zip(&channels) {
                *word = to_raw(self.format, sample_value(ch, self.seq));
            }
            self.seq = self.seq.wrapping_add(1);
        }
    }
}

/// An in-memory converter.
pub struct DummyConverter {
    name: String,
    state: Arc<Mutex<ConverterState>>,
}

impl DummyConverter {
    /// Creates a converter with `num_channels` channels of `format`.
    pub fn new(name: &str, num_channels: usize, format: RawFormat) -> Self {
        let state = ConverterState {
            format,
            num_channels,
            fifo_depth: 0,
            enabled: 0,
            mode: ConversionMode::Standby,
            modes: Vec::new(),
            trigger: None,
            seq: 0,
            pending: false,
            ready_delay: 0,
            ready_polls: 0,
            watermark: 0,
            fifo_level: 0,
            fifo_fill: 16,
            batches: Vec::new(),
            reads: 0,
            fail_enable: None,
            fail_read_after: None,
            fail_standby: false,
            stall_ready: false,
            stall_fifo: false,
        };
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Gives the converter a FIFO of `depth` scans.
    pub fn with_fifo(self, depth: usize) -> Self {
        self.state.lock().fifo_depth = depth;
        self
    }

    /// Gets a handle to inspect and steer the converter.
    pub fn handle(&self) -> DummyHandle {
        DummyHandle {
            state: self.state.clone(),
        }
    }
}

impl fmt::Debug for DummyConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyConverter")
            .field("name", &self.name)
            .field("handle", &self.handle())
            .finish()
    }
}

impl ConverterDriver for DummyConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn num_channels(&self) -> usize {
        self.state.lock().num_channels
    }

    fn raw_format(&self) -> RawFormat {
        self.state.lock().format
    }

    fn set_channel_enable(&mut self, channel: u8, on: bool) -> Status {
        let mut st = self.state.lock();
        if usize::from(channel) >= st.num_channels {
            return -errno::EINVAL;
        }
        if st.fail_enable == Some(channel) {
            return -errno::EIO;
        }
        if on {
            st.enabled |= 1 << channel;
        }
        else {
            st.enabled &= !(1 << channel);
        }
        0
    }

    fn set_conversion_mode(&mut self, mode: ConversionMode) -> Status {
        let mut st = self.state.lock();
        if st.fail_standby && mode == ConversionMode::Standby {
            return -errno::EIO;
        }
        st.mode = mode;
        st.modes.push(mode);
        st.pending = false;
        if mode != ConversionMode::Continuous {
            st.fifo_level = 0;
        }
        0
    }

    fn start_conversion(&mut self) -> Status {
        let mut st = self.state.lock();
        if st.mode != ConversionMode::SingleShot {
            return -errno::EBUSY;
        }
        st.pending = true;
        st.ready_polls = st.ready_delay;
        0
    }

    fn conversion_ready(&mut self) -> Status {
        let mut st = self.state.lock();
        if st.stall_ready {
            return 0;
        }
        let (mode, pending) = (st.mode, st.pending);
        match mode {
            ConversionMode::Continuous => 1,
            ConversionMode::SingleShot if pending => {
                if st.ready_polls > 0 {
                    st.ready_polls -= 1;
                    0
                }
                else {
                    1
                }
            }
            _ => 0,
        }
    }

    fn read_one_scan(&mut self, out: &mut [u32]) -> Status {
        let mut st = self.state.lock();
        let n = st.enabled_count();
        if out.len() < n {
            return -errno::EINVAL;
        }
        if !st.read_allowed() {
            return -errno::EIO;
        }
        st.generate(&mut out[..n]);
        st.pending = false;
        n as Status
    }

    fn configure_trigger_source(&mut self, kind: TriggerKind) -> Status {
        self.state.lock().trigger = Some(kind);
        0
    }

    fn fifo_depth(&self) -> usize {
        self.state.lock().fifo_depth
    }

    fn configure_fifo_watermark(&mut self, scans: u16) -> Status {
        let mut st = self.state.lock();
        if scans == 0 || usize::from(scans) > st.fifo_depth {
            return -errno::EINVAL;
        }
        st.watermark = scans;
        0
    }

    fn fifo_level(&mut self) -> Status {
        let mut st = self.state.lock();
        if st.fifo_depth == 0 {
            return -errno::EINVAL;
        }
        if st.mode == ConversionMode::Continuous && !st.stall_fifo {
            st.fifo_level = (st.fifo_level + st.fifo_fill).min(st.fifo_depth);
        }
        st.fifo_level as Status
    }

    fn read_fifo_batch(&mut self, out: &mut [u32]) -> Status {
        let mut st = self.state.lock();
        let n = st.enabled_count();
        if st.fifo_depth == 0 || n == 0 || out.len() % n != 0 {
            return -errno::EINVAL;
        }
        if !st.read_allowed() {
            return -errno::EIO;
        }
        let scans = (out.len() / n).min(st.fifo_level);
        st.generate(&mut out[..scans * n]);
        st.fifo_level -= scans;
        st.batches.push(scans);
        (scans * n) as Status
    }
}

/// Inspects and steers a [`DummyConverter`].
#[derive(Clone)]
pub struct DummyHandle {
    state: Arc<Mutex<ConverterState>>,
}

impl DummyHandle {
    /// The bit mask of enabled channels.
    pub fn enabled_mask(&self) -> u32 {
        self.state.lock().enabled
    }

    /// The current conversion mode.
    pub fn mode(&self) -> ConversionMode {
        self.state.lock().mode
    }

    /// Every conversion mode set so far, in order.
    pub fn mode_history(&self) -> Vec<ConversionMode> {
        self.state.lock().modes.clone()
    }

    /// The trigger source last configured.
    pub fn trigger_source(&self) -> Option<TriggerKind> {
        self.state.lock().trigger
    }

    /// The number of scans produced so far.
    pub fn scans_produced(&self) -> u32 {
        self.state.lock().seq
    }

    /// The FIFO watermark last programmed.
    pub fn watermark(&self) -> u16 {
        self.state.lock().watermark
    }

    /// The size, in scans, of every FIFO batch read so far.
    pub fn fifo_batches(&self) -> Vec<usize> {
        self.state.lock().batches.clone()
    }

    /// Makes enabling or disabling `channel` fail.
    pub fn fail_enable_on(&self, channel: u8) {
        self.state.lock().fail_enable = Some(channel);
    }

    /// Makes every data read after the first `reads` fail.
    pub fn fail_read_after(&self, reads: usize) {
        self.state.lock().fail_read_after = Some(reads);
    }

    /// Makes entering standby fail.
    pub fn fail_standby(&self, on: bool) {
        self.state.lock().fail_standby = on;
    }

    /// Keeps the conversion-ready flag low.
    pub fn stall_ready(&self, on: bool) {
        self.state.lock().stall_ready = on;
    }

    /// Stops the FIFO from filling.
    pub fn stall_fifo(&self, on: bool) {
        self.state.lock().stall_fifo = on;
    }

    /// Sets the number of status polls a single-shot conversion takes.
    pub fn set_ready_delay(&self, polls: u32) {
        self.state.lock().ready_delay = polls;
    }

    /// Sets the number of scans the FIFO gains per level poll.
    pub fn set_fifo_fill_rate(&self, scans: usize) {
        self.state.lock().fifo_fill = scans;
    }

    /// Produces whole scans of the enabled channels into `out`, the way a
    /// DMA request line would.
    pub fn fill_words(&self, out: &mut [u32]) {
        self.state.lock().generate(out);
    }
}

impl fmt::Debug for DummyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("DummyHandle")
            .field("enabled", &format_args!("{:#b}", st.enabled))
            .field("mode", &st.mode)
            .field("seq", &st.seq)
            .finish()
    }
}

// --------------------------------------------------------------------------

struct TriggerState {
    armed: bool,
    cb: Option<TriggerCallback>,
    fail_disarm: bool,
    fired: usize,
}

/// An in-memory trigger, fired by hand through its handle.
pub struct DummyTrigger {
    kind: TriggerKind,
    state: Arc<Mutex<TriggerState>>,
}

impl DummyTrigger {
    /// Creates a trigger of the given kind.
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(TriggerState {
                armed: false,
                cb: None,
                fail_disarm: false,
                fired: 0,
            })),
        }
    }

    /// Gets a handle to fire the trigger.
    pub fn handle(&self) -> DummyTriggerHandle {
        DummyTriggerHandle {
            state: self.state.clone(),
        }
    }
}

impl fmt::Debug for DummyTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyTrigger")
            .field("kind", &self.kind)
            .field("handle", &self.handle())
            .finish()
    }
}

impl TriggerSource for DummyTrigger {
    fn kind(&self) -> TriggerKind {
        self.kind
    }

    fn register_callback(&mut self, cb: TriggerCallback) -> Status {
        self.state.lock().cb = Some(cb);
        0
    }

    fn clear_callback(&mut self) -> Status {
        self.state.lock().cb = None;
        0
    }

    fn arm(&mut self) -> Status {
        self.state.lock().armed = true;
        0
    }

    fn disarm(&mut self) -> Status {
        let mut st = self.state.lock();
        if st.fail_disarm {
            return -errno::EIO;
        }
        st.armed = false;
        0
    }
}

/// Fires a [`DummyTrigger`].
///
/// The callback runs on the firing thread with the trigger locked, the way
/// an interrupt can't be disarmed half way through its handler.
#[derive(Clone)]
pub struct DummyTriggerHandle {
    state: Arc<Mutex<TriggerState>>,
}

impl DummyTriggerHandle {
    /// Raises one event. Returns `true` if a callback ran.
    pub fn fire(&self) -> bool {
        let mut st = self.state.lock();
        if !st.armed {
            return false;
        }
        match st.cb.as_mut() {
            Some(cb) => {
                cb();
                st.fired += 1;
                true
            }
            None => false,
        }
    }

    /// Raises `n` events. Returns the number that ran a callback.
    pub fn fire_n(&self, n: usize) -> usize {
        (0..n).filter(|_| self.fire()).count()
    }

    /// Determines if the trigger is armed.
    pub fn is_armed(&self) -> bool {
        self.state.lock().armed
    }

    /// The number of events delivered to a callback.
    pub fn fired(&self) -> usize {
        self.state.lock().fired
    }

    /// Makes disarming fail.
    pub fn fail_disarm(&self, on: bool) {
        self.state.lock().fail_disarm = on;
    }
}

impl fmt::Debug for DummyTriggerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("DummyTriggerHandle")
            .field("armed", &st.armed)
            .field("fired", &st.fired)
            .finish()
    }
}

// --------------------------------------------------------------------------

struct DmaState {
    cb: Option<DmaCallback>,
    window: Option<Arc<DmaWindow>>,
    running: bool,
    next_half: usize,
    budget: Option<usize>,
    events: Vec<DmaEvent>,
    deferred: bool,
    pending: VecDeque<DmaEvent>,
}

/// An in-memory circular DMA engine fed by a [`DummyConverter`].
///
/// It moves one half of the window per call to
/// [`DummyDmaHandle::advance()`].
pub struct DummyDma {
    state: Arc<Mutex<DmaState>>,
    converter: DummyHandle,
}

impl DummyDma {
    /// Creates an engine reading from the converter behind `converter`.
    pub fn new(converter: DummyHandle) -> Self {
        Self {
            state: Arc::new(Mutex::new(DmaState {
                cb: None,
                window: None,
                running: false,
                next_half: 0,
                budget: None,
                events: Vec::new(),
                deferred: false,
                pending: VecDeque::new(),
            })),
            converter,
        }
    }

    /// Gets a handle to clock the engine.
    pub fn handle(&self) -> DummyDmaHandle {
        DummyDmaHandle {
            state: self.state.clone(),
            converter: self.converter.clone(),
        }
    }
}

impl fmt::Debug for DummyDma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyDma")
            .field("handle", &self.handle())
            .finish()
    }
}

impl DmaEngine for DummyDma {
    fn register_callback(&mut self, cb: DmaCallback) -> Status {
        self.state.lock().cb = Some(cb);
        0
    }

    fn clear_callback(&mut self) -> Status {
        self.state.lock().cb = None;
        0
    }

    fn start(&mut self, window: Arc<DmaWindow>) -> Status {
        let mut st = self.state.lock();
        if st.running {
            return -errno::EBUSY;
        }
        if window.is_empty() {
            return -errno::EINVAL;
        }
        st.window = Some(window);
        st.next_half = 0;
        st.running = true;
        0
    }

    fn stop_after(&mut self, words: usize) -> Status {
        self.state.lock().budget = Some(words);
        0
    }

    fn stop(&mut self) -> Status {
        let mut st = self.state.lock();
        st.running = false;
        st.window = None;
        st.budget = None;
        0
    }
}

/// Clocks a [`DummyDma`].
#[derive(Clone)]
pub struct DummyDmaHandle {
    state: Arc<Mutex<DmaState>>,
    converter: DummyHandle,
}

impl DummyDmaHandle {
    /// Moves one half (or what is left of the stop budget) into the window
    /// and signals it.
    ///
    /// Returns the event raised, or `None` if the engine is stopped or the
    /// half was still owned by software. In the latter case the data is
    /// lost and the window latches an overrun.
    pub fn advance(&self) -> Option<DmaEvent> {
        let mut st = self.state.lock();
        if !st.running {
            return None;
        }
        let window = st.window.clone()?;
        let half = st.next_half;
        let half_words = window.half_words();
        let words = st.budget.map_or(half_words, |b| b.min(half_words));
        if words == 0 {
            st.running = false;
            return None;
        }

        st.next_half ^= 1;
        if let Some(budget) = st.budget {
            st.budget = Some(budget - words);
            if budget == words {
                st.running = false;
            }
        }

        let conv = &self.converter;
        if !window.fill(half, |mem| conv.fill_words(&mut mem[..words])) {
            return None;
        }
        window.release_to_software(half);

        let ev = if words < half_words {
            DmaEvent::Halted { half, words }
        }
        else if half == 0 {
            DmaEvent::HalfComplete
        }
        else {
            DmaEvent::FullComplete
        };
        st.events.push(ev);
        if st.deferred {
            st.pending.push_back(ev);
        }
        else if let Some(cb) = st.cb.as_mut() {
            cb(ev);
        }
        Some(ev)
    }

    /// Holds completion callbacks back until [`deliver()`](Self::deliver),
    /// the way a busy CPU would be late servicing the interrupt.
    pub fn set_deferred(&self, on: bool) {
        self.state.lock().deferred = on;
    }

    /// Runs the callbacks held back while deferred. Returns how many ran.
    pub fn deliver(&self) -> usize {
        let mut st = self.state.lock();
        let mut n = 0;
        while let Some(ev) = st.pending.pop_front() {
            if let Some(cb) = st.cb.as_mut() {
                cb(ev);
                n += 1;
            }
        }
        n
    }

    /// Advances until the engine stops or `max` events were raised.
    /// Returns the number of events.
    pub fn run(&self, max: usize) -> usize {
        (0..max).take_while(|_| self.advance().is_some()).count()
    }

    /// Determines if the engine is running.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// The window the engine is filling.
    pub fn window(&self) -> Option<Arc<DmaWindow>> {
        self.state.lock().window.clone()
    }

    /// Every event raised so far.
    pub fn events(&self) -> Vec<DmaEvent> {
        self.state.lock().events.clone()
    }
}

impl fmt::Debug for DummyDmaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.lock();
        f.debug_struct("DummyDmaHandle")
            .field("running", &st.running)
            .field("next_half", &st.next_half)
            .field("budget", &st.budget)
            .finish()
    }
}

// --------------------------------------------------------------------------
//                              Unit Tests
// --------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_words_follow_the_format() {
        let f = RawFormat::new(12, RawCoding::Unipolar).with_shift(4);
        assert_eq!(to_raw(f, 0x123), 0x1230);
        assert_eq!(to_raw(f, 0xfff_f), 0xfff0);

        let f = RawFormat::new(16, RawCoding::OffsetBinary);
        assert_eq!(to_raw(f, 0), 0x8000);
        assert_eq!(to_raw(f, 5), 0x8005);
    }

    #[test]
    fn single_shot_honors_ready_delay() {
        let mut conv = DummyConverter::new("d", 2, RawFormat::new(16, RawCoding::Unipolar));
        let handle = conv.handle();
        handle.set_ready_delay(2);

        assert_eq!(conv.start_conversion(), -errno::EBUSY);
        conv.set_conversion_mode(ConversionMode::SingleShot);
        assert_eq!(conv.start_conversion(), 0);
        assert_eq!(conv.conversion_ready(), 0);
        assert_eq!(conv.conversion_ready(), 0);
        assert_eq!(conv.conversion_ready(), 1);
    }

    #[test]
    fn scans_carry_the_pattern() {
        let mut conv = DummyConverter::new("d", 4, RawFormat::new(16, RawCoding::Unipolar));
        conv.set_channel_enable(1, true);
        conv.set_channel_enable(3, true);

        let mut words = [0u32; 2];
        assert_eq!(conv.read_one_scan(&mut words), 2);
        assert_eq!(words, [sample_value(1, 0), sample_value(3, 0)]);
        assert_eq!(conv.read_one_scan(&mut words), 2);
        assert_eq!(words, [sample_value(1, 1), sample_value(3, 1)]);
    }

    #[test]
    fn fifo_fills_while_running() {
        let mut conv =
            DummyConverter::new("d", 2, RawFormat::new(16, RawCoding::Unipolar)).with_fifo(8);
        let handle = conv.handle();
        handle.set_fifo_fill_rate(3);
        conv.set_channel_enable(0, true);

        assert_eq!(conv.fifo_level(), 0);
        conv.set_conversion_mode(ConversionMode::Continuous);
        assert_eq!(conv.fifo_level(), 3);
        assert_eq!(conv.fifo_level(), 6);
        assert_eq!(conv.fifo_level(), 8);

        let mut words = [0u32; 5];
        assert_eq!(conv.read_fifo_batch(&mut words), 5);
        assert_eq!(handle.fifo_batches(), vec![5]);
        assert_eq!(conv.configure_fifo_watermark(9), -errno::EINVAL);
    }

    #[test]
    fn dma_halts_on_budget() {
        let mut conv = DummyConverter::new("d", 2, RawFormat::new(16, RawCoding::Unipolar));
        conv.set_channel_enable(0, true);
        let mut dma = DummyDma::new(conv.handle());
        let handle = dma.handle();
        let window = DmaWindow::shared(4);

        dma.stop_after(6);
        dma.start(window.clone());

        assert_eq!(handle.advance(), Some(DmaEvent::HalfComplete));
        window.release_to_hardware(0);
        assert_eq!(handle.advance(), Some(DmaEvent::Halted { half: 1, words: 2 }));
        assert!(!handle.is_running());
        assert_eq!(handle.advance(), None);
    }

    #[test]
    fn dma_overrun_when_software_is_late() {
        let mut conv = DummyConverter::new("d", 1, RawFormat::new(16, RawCoding::Unipolar));
        conv.set_channel_enable(0, true);
        let mut dma = DummyDma::new(conv.handle());
        let handle = dma.handle();
        let window = DmaWindow::shared(2);
        dma.start(window.clone());

        assert!(handle.advance().is_some());
        assert!(handle.advance().is_some());
        assert_eq!(handle.advance(), None);
        assert!(window.overrun());
    }
}
