// iio-capture/src/bin/acq_capture.rs
//
// Copyright (c) 2019, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//

//! Rust application to run one capture session against the dummy
//! converter and print the scans.
//!
//! The interrupt-driven strategies get a thread that stands in for the
//! trigger interrupt or the DMA engine.
//!

use clap::{value_parser, Arg, ArgAction, Command};
use iio_capture::{
    dummy::{DummyConverter, DummyDma, DummyTrigger},
    hal::{RawCoding, RawFormat, TriggerKind},
    CaptureConfig, ChannelMask, Device, Pipeline, Progress, RingBuffer, StrategyKind,
};
use std::{
    fs, process,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn fail(msg: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", msg, err);
    process::exit(1);
}

fn main() {
    env_logger::init();

    let args = Command::new("acq_capture")
        .version(VERSION)
        .author("Frank Pagliughi")
        .about("Capture scans from the dummy converter.")
        .disable_help_flag(true)
        .arg(
            Arg::new("help")
                .short('?')
                .long("help")
                .global(true)
                .action(ArgAction::Help)
                .help("Print help information"),
        )
        .arg(
            Arg::new("profile")
                .short('p')
                .long("profile")
                .action(ArgAction::Set)
                .help("TOML capture profile"),
        )
        .arg(
            Arg::new("strategy")
                .short('s')
                .long("strategy")
                .action(ArgAction::Set)
                .value_parser(StrategyKind::from_str)
                .help("burst, continuous, dma or fifo (overrides the profile)"),
        )
        .arg(
            Arg::new("mask")
                .short('m')
                .long("mask")
                .action(ArgAction::Set)
                .value_parser(ChannelMask::from_str)
                .default_value("0,1")
                .help("Channels to capture, as a list (0,2,5) or hex bits (0x25)"),
        )
        .arg(
            Arg::new("samples")
                .short('n')
                .long("samples")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .default_value("16")
                .help("Number of scans to capture"),
        )
        .arg(
            Arg::new("buffer")
                .short('b')
                .long("buffer")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .default_value("65536")
                .help("Ring buffer size, in bytes"),
        )
        .arg(
            Arg::new("raw")
                .short('r')
                .long("raw")
                .action(ArgAction::SetTrue)
                .help("Hex-dump the captured bytes instead of decoding them"),
        )
        .get_matches();

    let mut config = match args.get_one::<String>("profile") {
        Some(path) => {
            let text = fs::read_to_string(path).unwrap_or_else(|err| fail("Can't read profile", err));
            CaptureConfig::from_toml_str(&text).unwrap_or_else(|err| fail("Bad profile", err))
        }
        None => CaptureConfig::default(),
    };
    if let Some(kind) = args.get_one::<StrategyKind>("strategy") {
        config.strategy = *kind;
    }
    let mask = args.get_one::<ChannelMask>("mask").copied().unwrap_or(ChannelMask::first(2));
    let samples = args.get_one::<usize>("samples").copied().unwrap_or(16);
    let bufsz = args.get_one::<usize>("buffer").copied().unwrap_or(65536);
    let strategy = config.strategy;

    let conv = DummyConverter::new("dummy", 8, RawFormat::new(24, RawCoding::TwosComplement))
        .with_fifo(256);
    let dma = DummyDma::new(conv.handle());
    let dma_handle = dma.handle();
    let trig = DummyTrigger::new(TriggerKind::Timer);
    let trig_handle = trig.handle();

    let dev = Device::new(conv).unwrap_or_else(|err| fail("Error creating the device", err));
    let (sink, mut reader) =
        RingBuffer::with_capacity(bufsz).unwrap_or_else(|err| fail("Bad buffer size", err));
    let mut pipe = Pipeline::new(dev, trig, sink, config)
        .unwrap_or_else(|err| fail("Error creating the pipeline", err))
        .with_dma(dma);

    let plan = pipe
        .prepare(mask, samples)
        .unwrap_or_else(|err| fail("Can't prepare the capture", err));
    pipe.arm().unwrap_or_else(|err| fail("Can't arm the converter", err));

    let quit = Arc::new(AtomicBool::new(false));
    let irq = {
        let quit = quit.clone();
        thread::spawn(move || {
            while !quit.load(Ordering::Relaxed) {
                match strategy {
                    StrategyKind::Continuous => {
                        trig_handle.fire();
                    }
                    StrategyKind::ContinuousDma => {
                        dma_handle.advance();
                    }
                    _ => break,
                }
                thread::yield_now();
            }
        })
    };

    let res = loop {
        match pipe.service() {
            Ok(Progress::Complete) => break Ok(()),
            Ok(_) => thread::yield_now(),
            Err(err) => break Err(err),
        }
    };
    quit.store(true, Ordering::Relaxed);
    let _ = irq.join();

    if let Err(err) = res {
        fail("Capture failed", err);
    }

    let stats = pipe.stats();
    println!(
        "{}: {} scans, {} bytes in {:?} (status {})",
        strategy,
        stats.delivered,
        stats.bytes_written,
        stats.elapsed,
        pipe.poll_status()
    );

    let bps = plan.bytes_per_scan();
    let data = reader.read_all();
    let fmt = pipe.with_device(|dev| *dev.format());
    let raw = args.get_one::<bool>("raw").copied().unwrap_or(false);

    for (i, scan) in data.chunks_exact(bps).enumerate() {
        if raw {
            let hex: Vec<String> = scan.iter().map(|b| format!("{:02x}", b)).collect();
            println!("{:6}: {}", i, hex.join(" "));
        }
        else {
            let vals: Vec<String> = plan
                .active_channels()
                .iter()
                .filter_map(|&ch| plan.offset_of(ch))
                .map(|off| fmt.decode(&scan[off..]).to_string())
                .collect();
            println!("{:6}: {}", i, vals.join("\t"));
        }
    }
}
