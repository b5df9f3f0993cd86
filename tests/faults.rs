// iio-capture/tests/faults.rs
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//
//! Failure paths: every one of them must leave the pipeline idle.

use std::time::Duration;

use iio_capture::{
    dummy::{DummyConverter, DummyDma, DummyDmaHandle, DummyHandle, DummyTrigger, DummyTriggerHandle},
    hal::{ConversionMode, RawCoding, RawFormat, TriggerKind},
    CaptureConfig, ChannelMask, Device, Error, ErrorClass, OverflowPolicy, Pipeline, Progress,
    RingBuffer, RingReader, State, StrategyKind,
};
use nix::errno::Errno;

struct Rig {
    pipe: Pipeline,
    reader: RingReader,
    conv: DummyHandle,
    trig: DummyTriggerHandle,
    dma: DummyDmaHandle,
}

fn rig_with(conv: DummyConverter, config: CaptureConfig, buf_bytes: usize) -> Rig {
    let conv_handle = conv.handle();
    let dma = DummyDma::new(conv.handle());
    let dma_handle = dma.handle();
    let trig = DummyTrigger::new(TriggerKind::Timer);
    let trig_handle = trig.handle();

    let dev = Device::new(conv).unwrap();
    let (sink, reader) = RingBuffer::with_capacity(buf_bytes).unwrap();
    let pipe = Pipeline::new(dev, trig, sink, config).unwrap().with_dma(dma);
    Rig {
        pipe,
        reader,
        conv: conv_handle,
        trig: trig_handle,
        dma: dma_handle,
    }
}

fn rig(config: CaptureConfig, buf_bytes: usize) -> Rig {
    let conv = DummyConverter::new("adc0", 8, RawFormat::new(16, RawCoding::OffsetBinary))
        .with_fifo(64);
    rig_with(conv, config, buf_bytes)
}

fn config(kind: StrategyKind) -> CaptureConfig {
    CaptureConfig::builder()
        .strategy(kind)
        .wait_timeout(Duration::from_millis(1))
        .dma_half_scans(4)
        .build()
        .unwrap()
}

#[test]
fn stalled_conversion_times_out_to_idle() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.conv.stall_ready(true);

    let err = rig.pipe.capture(ChannelMask::first(2), 10).unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)));
    assert_eq!(err.class(), ErrorClass::Timeout);
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -110);
    assert_eq!(rig.conv.mode(), ConversionMode::Standby);
    assert!(rig.reader.is_empty());
}

#[test]
fn stalled_fifo_times_out() {
    let mut rig = rig(config(StrategyKind::FifoBatched), 1024);
    rig.conv.stall_fifo(true);

    let err = rig.pipe.capture(ChannelMask::first(1), 10).unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert!(!rig.trig.is_armed());
}

#[test]
fn silent_trigger_times_out() {
    let mut rig = rig(config(StrategyKind::Continuous), 1024);
    let err = rig.pipe.capture(ChannelMask::first(1), 10).unwrap_err();
    assert!(matches!(err, Error::TimedOut(_)));
    assert_eq!(rig.pipe.poll_status(), -110);
    assert!(!rig.trig.is_armed());
}

#[test]
fn failed_prepare_leaves_no_channel_enabled() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.conv.fail_enable_on(3);

    let mask = ChannelMask::from_channels(&[0, 1, 3]).unwrap();
    match rig.pipe.prepare(mask, 10) {
        Err(Error::ChannelEnable { channel: 3, .. }) => (),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.conv.enabled_mask(), 0);
    assert!(rig.pipe.with_device(|dev| dev.enabled_mask().is_empty()));
}

#[test]
fn config_errors_are_synchronous() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);

    let err = rig.pipe.prepare(ChannelMask::new(1 << 9), 1).unwrap_err();
    assert!(matches!(err, Error::InvalidMask { num_channels: 8, .. }));
    assert_eq!(err.class(), ErrorClass::Config);

    assert!(matches!(
        rig.pipe.prepare(ChannelMask::NONE, 1),
        Err(Error::InvalidConfig(_))
    ));
    assert!(matches!(
        rig.pipe.prepare(ChannelMask::first(1), 0),
        Err(Error::UnboundedRequest)
    ));
    assert!(matches!(
        rig.pipe.capture(ChannelMask::first(1), 0),
        Err(Error::UnboundedRequest)
    ));

    rig.pipe.set_strategy(StrategyKind::FifoBatched).unwrap();
    assert!(matches!(
        rig.pipe.prepare(ChannelMask::first(1), 0),
        Err(Error::UnboundedRequest)
    ));

    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.conv.enabled_mask(), 0);
}

#[test]
fn scan_larger_than_buffer_is_rejected() {
    let mut rig = rig(config(StrategyKind::Burst), 8);
    assert!(rig.pipe.prepare(ChannelMask::first(4), 1).is_ok());
    rig.pipe.end().unwrap();
    assert!(matches!(
        rig.pipe.prepare(ChannelMask::first(5), 1),
        Err(Error::InvalidConfig(_))
    ));
    assert_eq!(rig.conv.enabled_mask(), 0);
}

#[test]
fn missing_hardware_is_unsupported() {
    let conv = DummyConverter::new("plain", 4, RawFormat::new(12, RawCoding::Unipolar));
    let dev = Device::new(conv).unwrap();
    let (sink, _reader) = RingBuffer::with_capacity(1024).unwrap();
    let mut pipe = Pipeline::new(
        dev,
        DummyTrigger::new(TriggerKind::Timer),
        sink,
        config(StrategyKind::ContinuousDma),
    )
    .unwrap();

    assert!(matches!(
        pipe.prepare(ChannelMask::first(1), 10),
        Err(Error::UnsupportedStrategy(_))
    ));
    pipe.set_strategy(StrategyKind::FifoBatched).unwrap();
    assert!(matches!(
        pipe.prepare(ChannelMask::first(1), 10),
        Err(Error::UnsupportedStrategy(_))
    ));
    assert_eq!(pipe.state(), State::Idle);
}

#[test]
fn operations_out_of_order() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    assert!(matches!(rig.pipe.arm(), Err(Error::InvalidState { op: "arm", .. })));
    assert!(matches!(rig.pipe.service(), Err(Error::InvalidState { .. })));

    rig.pipe.prepare(ChannelMask::first(1), 2).unwrap();
    assert!(matches!(
        rig.pipe.prepare(ChannelMask::first(1), 2),
        Err(Error::InvalidState { state: State::Preparing, .. })
    ));
    assert!(rig.pipe.set_strategy(StrategyKind::Continuous).is_err());
    rig.pipe.end().unwrap();
    assert_eq!(rig.pipe.state(), State::Idle);
}

#[test]
fn end_is_idempotent() {
    let mut rig = rig(config(StrategyKind::Continuous), 1024);
    assert!(rig.pipe.end().is_ok());

    rig.pipe.prepare(ChannelMask::first(2), 0).unwrap();
    rig.pipe.arm().unwrap();
    assert_eq!(rig.trig.fire_n(3), 3);

    rig.pipe.end().unwrap();
    assert_eq!(rig.pipe.state(), State::Idle);
    assert!(!rig.trig.is_armed());
    assert!(!rig.trig.fire());
    assert_eq!(rig.conv.mode_history().last(), Some(&ConversionMode::Standby));

    rig.pipe.end().unwrap();
    rig.pipe.end().unwrap();
    assert_eq!(rig.pipe.stats().delivered, 3);
    assert_eq!(rig.reader.len(), 3 * 4);
}

#[test]
fn stop_before_arm() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.pipe.prepare(ChannelMask::first(2), 4).unwrap();
    rig.pipe.stop().unwrap();
    assert_eq!(rig.pipe.state(), State::Idle);
    assert!(rig.pipe.stop().is_ok());
    assert_eq!(rig.pipe.poll_status(), 0);
}

#[test]
fn end_after_completion_is_a_no_op() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.pipe.capture(ChannelMask::first(1), 2).unwrap();
    let modes = rig.conv.mode_history().len();

    rig.pipe.end().unwrap();
    assert_eq!(rig.conv.mode_history().len(), modes);
}

#[test]
fn partial_disarm_still_ends_idle() {
    let mut rig = rig(config(StrategyKind::Continuous), 1024);
    rig.pipe.prepare(ChannelMask::first(1), 0).unwrap();
    rig.pipe.arm().unwrap();

    rig.trig.fail_disarm(true);
    assert!(matches!(rig.pipe.end(), Err(Error::Bus(Errno::EIO))));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -5);

    // The callback is gone even though the line is still enabled.
    assert!(!rig.trig.fire());
    assert!(rig.pipe.end().is_ok());
}

#[test]
fn failed_standby_is_reported() {
    let mut rig = rig(config(StrategyKind::Continuous), 1024);
    rig.pipe.prepare(ChannelMask::first(1), 0).unwrap();
    rig.pipe.arm().unwrap();

    rig.conv.fail_standby(true);
    assert!(rig.pipe.end().is_err());
    assert_eq!(rig.pipe.state(), State::Idle);
}

#[test]
fn bus_error_mid_burst() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.conv.fail_read_after(2);

    let err = rig.pipe.capture(ChannelMask::first(1), 5).unwrap_err();
    assert!(matches!(err, Error::Bus(Errno::EIO)));
    assert_eq!(err.class(), ErrorClass::Bus);
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -5);
    assert_eq!(rig.pipe.stats().delivered, 2);
    assert_eq!(rig.reader.len(), 4);
}

#[test]
fn bus_error_in_handler_is_recorded() {
    let mut rig = rig(config(StrategyKind::Continuous), 1024);
    rig.conv.fail_read_after(1);
    rig.pipe.prepare(ChannelMask::first(1), 10).unwrap();
    rig.pipe.arm().unwrap();

    rig.trig.fire_n(3);
    assert!(matches!(rig.pipe.service(), Err(Error::Bus(Errno::EIO))));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.stats().delivered, 1);
}

#[test]
fn buffer_full_aborts_burst() {
    // Room for three 2-byte scans.
    let mut rig = rig(config(StrategyKind::Burst), 7);

    let err = rig.pipe.capture(ChannelMask::first(1), 5).unwrap_err();
    assert!(matches!(err, Error::BufferFull));
    assert_eq!(err.class(), ErrorClass::BufferFull);
    assert_eq!(rig.pipe.poll_status(), -105);
    assert_eq!(rig.pipe.stats().delivered, 3);
    assert_eq!(rig.reader.len(), 6);
}

#[test]
fn buffer_full_aborts_continuous_by_default() {
    let mut rig = rig(config(StrategyKind::Continuous), 8);
    rig.pipe.prepare(ChannelMask::first(2), 0).unwrap();
    rig.pipe.arm().unwrap();

    rig.trig.fire_n(5);
    assert!(matches!(rig.pipe.service(), Err(Error::BufferFull)));
    assert_eq!(rig.pipe.state(), State::Idle);
    let stats = rig.pipe.stats();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.dropped, 0);
}

#[test]
fn drop_policy_keeps_streaming() {
    let cfg = CaptureConfig::builder()
        .strategy(StrategyKind::Continuous)
        .overflow(OverflowPolicy::DropScan)
        .build()
        .unwrap();
    let mut rig = rig(cfg, 8);
    rig.pipe.prepare(ChannelMask::first(2), 0).unwrap();
    rig.pipe.arm().unwrap();

    rig.trig.fire_n(5);
    assert_eq!(rig.pipe.service().unwrap(), Progress::Pending);
    assert_eq!(rig.pipe.stats().dropped, 3);

    // Once the reader catches up, scans flow again.
    assert_eq!(rig.reader.read_all().len(), 8);
    rig.trig.fire_n(1);
    rig.pipe.end().unwrap();

    let stats = rig.pipe.stats();
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.dropped, 3);
    assert_eq!(rig.pipe.poll_status(), 0);
}

#[test]
fn fifo_buffer_full_aborts_under_any_policy() {
    let cfg = CaptureConfig::builder()
        .strategy(StrategyKind::FifoBatched)
        .overflow(OverflowPolicy::DropScan)
        .wait_timeout(Duration::from_millis(1))
        .build()
        .unwrap();
    // Room for ten 2-byte scans, drained as one batch of 30.
    let mut rig = rig(cfg, 20);

    let err = rig.pipe.capture(ChannelMask::first(1), 30).unwrap_err();
    assert!(matches!(err, Error::BufferFull));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -105);
    assert_eq!(rig.conv.fifo_batches(), vec![30]);

    let stats = rig.pipe.stats();
    assert_eq!(stats.delivered, 10);
    assert_eq!(stats.dropped, 0);
    assert_eq!(rig.reader.len(), 20);
}

#[test]
fn bus_error_during_fifo_drain() {
    let mut rig = rig(config(StrategyKind::FifoBatched), 1024);
    rig.conv.fail_read_after(1);

    let err = rig.pipe.capture(ChannelMask::first(1), 100).unwrap_err();
    assert!(matches!(err, Error::Bus(Errno::EIO)));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -5);
    assert_eq!(rig.conv.fifo_batches(), vec![64]);
    assert_eq!(rig.conv.mode(), ConversionMode::Standby);
    assert_eq!(rig.pipe.stats().delivered, 64);
    assert_eq!(rig.reader.len(), 128);
}

#[test]
fn dma_buffer_full_aborts_by_default() {
    // Room for five 2-byte scans; each half holds four.
    let mut rig = rig(config(StrategyKind::ContinuousDma), 10);
    rig.pipe.prepare(ChannelMask::first(1), 0).unwrap();
    rig.pipe.arm().unwrap();

    assert_eq!(rig.dma.run(2), 2);
    assert!(matches!(rig.pipe.service(), Err(Error::BufferFull)));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert_eq!(rig.pipe.poll_status(), -105);
    assert!(!rig.dma.is_running());

    let stats = rig.pipe.stats();
    assert_eq!(stats.delivered, 5);
    assert_eq!(stats.dropped, 0);
    assert_eq!(rig.reader.len(), 10);
}

#[test]
fn dma_drop_policy_keeps_streaming() {
    let cfg = CaptureConfig::builder()
        .strategy(StrategyKind::ContinuousDma)
        .overflow(OverflowPolicy::DropScan)
        .dma_half_scans(4)
        .build()
        .unwrap();
    let mut rig = rig(cfg, 10);
    rig.pipe.prepare(ChannelMask::first(1), 0).unwrap();
    rig.pipe.arm().unwrap();

    assert_eq!(rig.dma.run(2), 2);
    assert_eq!(rig.pipe.service().unwrap(), Progress::Pending);
    assert_eq!(rig.pipe.stats().delivered, 5);
    assert_eq!(rig.pipe.stats().dropped, 3);

    assert_eq!(rig.reader.read_all().len(), 10);
    assert!(rig.dma.advance().is_some());
    assert_eq!(rig.pipe.service().unwrap(), Progress::Pending);
    rig.pipe.end().unwrap();

    let stats = rig.pipe.stats();
    assert_eq!(stats.delivered, 9);
    assert_eq!(stats.dropped, 3);
    assert_eq!(rig.pipe.poll_status(), 0);
    assert_eq!(rig.reader.len(), 8);
}

#[test]
fn late_copy_out_is_a_dma_overrun() {
    let mut rig = rig(config(StrategyKind::ContinuousDma), 1024);
    rig.pipe.prepare(ChannelMask::first(1), 0).unwrap();
    rig.pipe.arm().unwrap();

    rig.dma.set_deferred(true);
    assert!(rig.dma.advance().is_some());
    assert!(rig.dma.advance().is_some());
    assert!(rig.dma.advance().is_none());
    assert_eq!(rig.dma.deliver(), 2);

    let err = rig.pipe.service().unwrap_err();
    assert!(matches!(err, Error::DmaOverrun));
    assert_eq!(rig.pipe.poll_status(), -(Errno::EOVERFLOW as i32));
    assert_eq!(rig.pipe.state(), State::Idle);
    assert!(!rig.dma.is_running());
}

#[test]
fn next_prepare_clears_status() {
    let mut rig = rig(config(StrategyKind::Burst), 1024);
    rig.conv.stall_ready(true);
    assert!(rig.pipe.capture(ChannelMask::first(1), 1).is_err());
    assert_ne!(rig.pipe.poll_status(), 0);

    rig.conv.stall_ready(false);
    rig.pipe.capture(ChannelMask::first(1), 1).unwrap();
    assert_eq!(rig.pipe.poll_status(), 0);
}

#[test]
fn offset_binary_is_twos_complement_on_the_wire() {
    let conv = DummyConverter::new("ob", 2, RawFormat::new(16, RawCoding::OffsetBinary));
    let mut rig = rig_with(conv, config(StrategyKind::Burst), 64);
    rig.pipe.capture(ChannelMask::first(2), 1).unwrap();

    // Scan 0 holds 0 and 1 for channels 0 and 1.
    assert_eq!(rig.reader.read_all(), vec![0, 0, 1, 0]);
}
