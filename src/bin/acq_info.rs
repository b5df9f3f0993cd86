// iio-capture/src/bin/acq_info.rs
//
// Copyright (c) 2018, Frank Pagliughi
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.
//

//! Rust application to show a converter and the scan layout of a channel
//! mask.
//!

use clap::{value_parser, Arg, ArgAction, Command};
use iio_capture::{
    dummy::DummyConverter,
    hal::{RawCoding, RawFormat},
    ChannelMask, Device,
};
use std::{process, str::FromStr};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn parse_coding(s: &str) -> Result<RawCoding, String> {
    match s {
        "unipolar" => Ok(RawCoding::Unipolar),
        "offset" => Ok(RawCoding::OffsetBinary),
        "twos" => Ok(RawCoding::TwosComplement),
        _ => Err(format!("unknown coding '{}'", s)),
    }
}

fn main() {
    env_logger::init();

    let args = Command::new("acq_info")
        .version(VERSION)
        .author("Frank Pagliughi")
        .about("Show a converter's channels and scan layout.")
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
            Arg::new("channels")
                .short('n')
                .long("channels")
                .action(ArgAction::Set)
                .value_parser(value_parser!(usize))
                .default_value("8")
                .help("Number of converter channels"),
        )
        .arg(
            Arg::new("bits")
                .short('b')
                .long("bits")
                .action(ArgAction::Set)
                .value_parser(value_parser!(u8))
                .default_value("24")
                .help("Converter resolution, in bits"),
        )
        .arg(
            Arg::new("coding")
                .short('c')
                .long("coding")
                .action(ArgAction::Set)
                .value_parser(parse_coding)
                .default_value("twos")
                .help("Raw coding: unipolar, offset or twos"),
        )
        .arg(
            Arg::new("mask")
                .short('m')
                .long("mask")
                .action(ArgAction::Set)
                .value_parser(ChannelMask::from_str)
                .help("Channels to plan, as a list (0,2,5) or hex bits (0x25)"),
        )
        .get_matches();

    let nchan = args.get_one::<usize>("channels").copied().unwrap_or(8);
    let bits = args.get_one::<u8>("bits").copied().unwrap_or(24);
    let coding = args
        .get_one::<RawCoding>("coding")
        .copied()
        .unwrap_or(RawCoding::TwosComplement);

    let conv = DummyConverter::new("dummy", nchan, RawFormat::new(bits, coding));
    let dev = Device::new(conv).unwrap_or_else(|err| {
        eprintln!("Error creating the device: {}", err);
        process::exit(1);
    });

    println!("Device: {}", dev.name());
    println!("\tSample format: {}", dev.format());
    println!("\t{} channels found:", dev.num_channels());
    for chan in dev.channels() {
        println!("\t\t{}: {}", chan.index(), chan.id());
    }

    if let Some(mask) = args.get_one::<ChannelMask>("mask") {
        let plan = dev.plan(*mask).unwrap_or_else(|err| {
            eprintln!("Error planning the scan: {}", err);
            process::exit(2);
        });
        println!("Scan of {:?}:", mask);
        println!("\t{} bytes per scan", plan.bytes_per_scan());
        for &ch in plan.active_channels() {
            println!(
                "\t\tvoltage{} at offset {}",
                ch,
                plan.offset_of(ch).unwrap_or_default()
            );
        }
    }
}
