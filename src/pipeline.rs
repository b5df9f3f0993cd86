// iio-capture/src/pipeline.rs
//
// Copyright (c) 2018-2020, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! The capture pipeline.
//!
//! A [`Pipeline`] owns one converter, its trigger, an optional DMA engine
//! and the ring buffer they feed. It runs one acquisition session at a
//! time through the state machine
//!
//! ```text
//! Idle -> Preparing -> Armed -> Streaming -> (Draining) -> Idle
//! ```
//!
//! and returns to `Idle` through `Stopping` on completion, on `end()`, or
//! on any error once hardware has been touched.
//!
//! ```no_run
//! use iio_capture::{dummy::*, hal::*, *};
//!
//! let conv = DummyConverter::new("adc0", 4, RawFormat::new(16, RawCoding::TwosComplement));
//! let dev = Device::new(conv)?;
//! let (sink, mut reader) = RingBuffer::with_capacity(4096)?;
//! let trig = DummyTrigger::new(TriggerKind::Software);
//!
//! let mut pipe = Pipeline::new(dev, trig, sink, CaptureConfig::default())?;
//! let stats = pipe.capture(ChannelMask::from_channels(&[0, 2])?, 10)?;
//! assert_eq!(reader.len(), stats.bytes_written);
//! # Ok::<(), iio_capture::Error>(())
//! ```

use std::{fmt, sync::Arc, time::Instant};

use converter_hal::{ConversionMode, DmaEngine, TriggerSource};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::{
    session::AcquisitionSession,
    strategy::{self, CaptureStrategy, Frontend, Hw},
    CaptureConfig, CaptureStats, ChannelMask, Device, Error, Progress, Result, RingSink,
    ScanHandler, ScanPlan, State, StrategyKind, Trigger,
};

// Borrows the pipeline and a session apart into the strategy context.
macro_rules! hw {
    ($pipe:ident, $session:ident) => {
        Hw {
            frontend: &$pipe.frontend,
            trigger: &mut $pipe.trigger,
            dma: $pipe.dma.as_mut(),
            shared: &$session.shared,
            plan: &$session.plan,
            supervisor: $pipe.config.supervisor(),
            config: &$pipe.config,
            batches: &mut $session.batches,
        }
    };
}

/// An acquisition pipeline over one converter.
pub struct Pipeline {
    frontend: Arc<Mutex<Frontend>>,
    trigger: Trigger,
    dma: Option<Box<dyn DmaEngine>>,
    config: CaptureConfig,
    state: State,
    session: Option<AcquisitionSession>,
    last_stats: CaptureStats,
    status: i32,
}

impl Pipeline {
    /// Creates a pipeline.
    ///
    /// The device's samples are written in the byte order the
    /// configuration asks for.
    pub fn new<T, S>(mut device: Device, trigger: T, sink: S, config: CaptureConfig) -> Result<Self>
    where
        T: TriggerSource + 'static,
        S: RingSink + 'static,
    {
        config.validate()?;
        device.set_big_endian(config.output.big_endian);
        info!(
            "{}: {} pipeline, {} channels, {}",
            device.name(),
            config.strategy,
            device.num_channels(),
            device.format()
        );
        Ok(Self {
            frontend: Arc::new(Mutex::new(Frontend::new(device, Box::new(sink)))),
            trigger: Trigger::new(trigger),
            dma: None,
            config,
            state: State::Idle,
            session: None,
            last_stats: CaptureStats::default(),
            status: 0,
        })
    }

    /// Attaches a DMA engine, needed by [`StrategyKind::ContinuousDma`].
    pub fn with_dma<E>(mut self, engine: E) -> Self
    where
        E: DmaEngine + 'static,
    {
        self.dma = Some(Box::new(engine));
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Gets the configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Gets the strategy the next session will use.
    pub fn strategy(&self) -> StrategyKind {
        self.config.strategy
    }

    /// Selects the strategy for the next session.
    pub fn set_strategy(&mut self, kind: StrategyKind) -> Result<()> {
        self.require(&[State::Idle], "set_strategy")?;
        self.config.strategy = kind;
        Ok(())
    }

    /// Runs `f` against the device.
    ///
    /// This takes the lock shared with the interrupt handlers, so keep it
    /// short while streaming.
    pub fn with_device<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Device) -> R,
    {
        f(&self.frontend.lock().device)
    }

    /// Gets the scan plan of the current session.
    pub fn scan_plan(&self) -> Option<&ScanPlan> {
        self.session.as_ref().map(|s| &s.plan)
    }

    /// Statistics of the current session, or of the last one once idle.
    pub fn stats(&self) -> CaptureStats {
        match self.session {
            Some(ref session) => session.stats(),
            None => self.last_stats,
        }
    }

    /// The number of scans delivered by the current (or last) session.
    pub fn samples_delivered(&self) -> usize {
        self.stats().delivered
    }

    /// The status of the last session: zero, or the negative errno of the
    /// error that ended it.
    pub fn poll_status(&self) -> i32 {
        self.status
    }

    fn require(&self, states: &[State], op: &'static str) -> Result<()> {
        if states.contains(&self.state) {
            Ok(())
        }
        else {
            Err(Error::InvalidState {
                op,
                state: self.state,
            })
        }
    }

    /// Configures the channels in `mask` for a session of `requested`
    /// scans, zero meaning "until stopped".
    ///
    /// On failure no channel is left enabled and the pipeline is idle.
    pub fn prepare(&mut self, mask: ChannelMask, requested: usize) -> Result<ScanPlan> {
        self.require(&[State::Idle], "prepare")?;
        self.state = State::Preparing;
        self.status = 0;

        match self.new_session(mask, requested) {
            Ok(session) => {
                let plan = session.plan.clone();
                debug!(
                    "session prepared: {:?}, {} scans of {} bytes",
                    plan.active_channels(),
                    requested,
                    plan.bytes_per_scan()
                );
                self.last_stats = session.stats();
                self.session = Some(session);
                Ok(plan)
            }
            Err(err) => {
                warn!("prepare failed: {}", err);
                if let Err(e) = self.frontend.lock().device.disable_all() {
                    warn!("can't disable channels: {}", e);
                }
                self.state = State::Idle;
                self.status = err.status();
                Err(err)
            }
        }
    }

    fn new_session(&self, mask: ChannelMask, requested: usize) -> Result<AcquisitionSession> {
        let strategy = strategy::build(self.config.strategy);
        let mut fe = self.frontend.lock();

        let plan = fe.device.plan(mask)?;
        if plan.channel_count() == 0 {
            return Err(Error::InvalidConfig("no channels selected".into()));
        }
        strategy.check(requested, &fe.device, self.dma.is_some())?;

        fe.device.apply_mask(mask)?;
        let usable = fe.sink.align_to(plan.bytes_per_scan())?;
        fe.reserve(&plan);
        debug!("ring buffer usable capacity: {} bytes", usable);

        Ok(AcquisitionSession::new(strategy, plan, requested))
    }

    /// Starts the conversion source for the prepared session.
    pub fn arm(&mut self) -> Result<()> {
        self.require(&[State::Preparing], "arm")?;

        let res = match self.session.as_mut() {
            Some(session) => {
                let res = session.strategy.arm(&mut hw!(self, session));
                if res.is_ok() {
                    session.armed_at = Some(Instant::now());
                }
                res
            }
            None => Err(Error::InvalidState {
                op: "arm",
                state: self.state,
            }),
        };

        match res {
            Ok(()) => {
                self.state = State::Armed;
                info!("armed for {}", self.strategy());
                Ok(())
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Gets the sample-ready handler of an armed continuous session.
    ///
    /// The handler is also installed on the trigger; this is for platforms
    /// that dispatch the interrupt themselves.
    pub fn trigger_handler(&self) -> Option<ScanHandler> {
        let session = self.session.as_ref()?;
        if session.kind() != StrategyKind::Continuous {
            return None;
        }
        Some(ScanHandler::new(
            self.frontend.clone(),
            session.shared.clone(),
            session.plan.channel_count(),
            self.config.overflow,
        ))
    }

    /// Does the main-loop share of the work, then reports progress.
    ///
    /// On completion the session is stopped. On error the session is
    /// stopped, the error is returned, and its status is kept for
    /// [`poll_status()`](Self::poll_status).
    pub fn service(&mut self) -> Result<Progress> {
        self.require(&[State::Armed, State::Streaming, State::Draining], "service")?;

        let res = match self.session.as_mut() {
            Some(session) => session.strategy.service(&mut hw!(self, session)),
            None => Err(Error::InvalidState {
                op: "service",
                state: self.state,
            }),
        };

        match res {
            Ok(Progress::Complete) => {
                let stats = self.stats();
                info!(
                    "session complete: {} scans, {} bytes in {:?}",
                    stats.delivered, stats.bytes_written, stats.elapsed
                );
                if let Err(err) = self.end() {
                    warn!("stop after completion failed: {}", err);
                }
                Ok(Progress::Complete)
            }
            Ok(progress) => {
                self.state = match progress {
                    Progress::Draining => State::Draining,
                    _ => State::Streaming,
                };
                Ok(progress)
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Stops the session and returns to `Idle`.
    ///
    /// This may be called from any state and any number of times. Every
    /// teardown step is attempted; the first failure is returned, but the
    /// pipeline is idle either way.
    pub fn end(&mut self) -> Result<()> {
        if self.state == State::Idle {
            return Ok(());
        }
        debug!("{} -> stopping", self.state);
        self.state = State::Stopping;

        let mut res = Ok(());
        if let Some(mut session) = self.session.take() {
            res = session.strategy.disarm(&mut hw!(self, session));
            self.last_stats = session.stats();
            if self.last_stats.dropped > 0 {
                warn!("{} scan(s) dropped on a full buffer", self.last_stats.dropped);
            }
        }

        let standby = self
            .frontend
            .lock()
            .device
            .set_conversion_mode(ConversionMode::Standby);
        res = res.and(standby);

        self.state = State::Idle;
        if let Err(ref err) = res {
            warn!("teardown incomplete: {}", err);
            if self.status == 0 {
                self.status = err.status();
            }
        }
        res
    }

    /// Cancels the session. The same as [`end`](Self::end).
    pub fn stop(&mut self) -> Result<()> {
        self.end()
    }

    // Stops the session after `err`, keeping its status.
    fn abort(&mut self, err: Error) -> Error {
        error!("session aborted in {} state: {}", self.state, err);
        self.status = err.status();
        if let Err(e) = self.end() {
            warn!("stop after abort failed: {}", e);
        }
        err
    }

    /// Captures exactly `requested` scans of the channels in `mask`.
    ///
    /// This runs a whole session: prepare, arm, service until complete.
    /// For the interrupt-driven strategies the wait for each new scan is
    /// bounded by the configured timeout, in real time.
    pub fn capture(&mut self, mask: ChannelMask, requested: usize) -> Result<CaptureStats> {
        if requested == 0 {
            return Err(Error::UnboundedRequest);
        }
        self.prepare(mask, requested)?;
        self.arm()?;

        let supervisor = self.config.supervisor();
        loop {
            let before = self.stats();
            if self.service()? == Progress::Complete {
                break;
            }
            if !self.strategy().is_interrupt_driven() {
                continue;
            }
            let shared = match self.session {
                Some(ref session) => session.shared.clone(),
                None => break,
            };
            let res = supervisor.observe_until("scan delivery", || {
                Ok(shared.delivered() != before.delivered
                    || shared.dropped() != before.dropped
                    || shared.fault().is_some())
            });
            if let Err(err) = res {
                return Err(self.abort(err));
            }
        }
        Ok(self.stats())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("strategy", &self.config.strategy)
            .field("trigger", &self.trigger)
            .field("dma", &self.dma.is_some())
            .field("session", &self.session)
            .field("status", &self.status)
            .finish()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(err) = self.end() {
            warn!("teardown on drop failed: {}", err);
        }
    }
}
