//! Decode a captured rig byte log and print the export record as JSON.
//!
//! Usage: cargo run --example replay -- <capture.bin> [single|dual]

use std::time::Duration;
use treadmill::{Pipeline, ReplaySource, RigConfig, SensorLayout};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("Usage: replay <capture.bin> [single|dual]");
        std::process::exit(2);
    };
    let layout = match args.next().as_deref() {
        Some("single") => SensorLayout::Single,
        _ => SensorLayout::Dual,
    };

    let config = RigConfig::from_env().with_layout(layout);
    let source = match ReplaySource::open(&path) {
        Ok(s) => s.with_poll_timeout(Duration::ZERO),
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let mut pipeline = Pipeline::new(source, config.layout, config.fusion);
    loop {
        match pipeline.step() {
            Ok(treadmill::pipeline::Step::Dispatched(_)) => {}
            Ok(treadmill::pipeline::Step::Terminated) => {
                eprintln!("Terminate frame reached");
                break;
            }
            Ok(_) => break,
            Err(e) => {
                eprintln!("Capture ends mid-frame: {}", e);
                break;
            }
        }
    }

    let counts = pipeline.session().counts();
    eprintln!(
        "{} sync, {} odor on, {} odor off, {} motion, {} unknown",
        counts.daq_sync, counts.odor_on, counts.odor_off, counts.motion, counts.unknown
    );

    let export = pipeline.into_session().finalize(config.overflow_modulus);
    match serde_json::to_string_pretty(&export) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize session: {}", e),
    }
}
