//! Record a session from the rig and print the export record as JSON.
//!
//! Usage: cargo run --example record -- [seconds]
//! Port, baud rate and sensor layout come from TREADMILL_* variables.

use std::time::{Duration, Instant};
use treadmill::{spawn_consumer, CancelToken, Consumer, PositionFeed, Rig, RigConfig};

/// Prints every fused point the acquisition thread pushes.
struct PrintPlot {
    feed: PositionFeed,
}

impl Consumer for PrintPlot {
    fn name(&self) -> &str {
        "plot"
    }

    fn render(&mut self) -> treadmill::Result<()> {
        for p in self.feed.drain() {
            println!("ts={:<12} x={:+9.1} y={:+9.1}", p.timestamp, p.x, p.y);
        }
        Ok(())
    }
}

fn main() {
    env_logger::init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    let config = RigConfig::from_env();
    let modulus = config.overflow_modulus;
    let rig = match Rig::open(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to open rig: {}", e);
            if let Ok(ports) = treadmill::list_ports() {
                for port in ports {
                    eprintln!("  available: {} ({:?})", port.name, port.kind);
                }
            }
            std::process::exit(1);
        }
    };

    eprintln!("Port:    {}", rig.port_name());
    eprintln!("Baud:    {}", rig.config().baud_rate);
    eprintln!("Sensors: {:?}", rig.config().layout);
    match rig.bytes_available() {
        Ok(0) => {}
        Ok(n) => eprintln!("Note: {} stale bytes already buffered on the port", n),
        Err(e) => eprintln!("Couldn't query the receive buffer: {}", e),
    }

    let cancel = CancelToken::new();
    let acquisition = match rig.start_acquisition_with_cancel(cancel.clone()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Failed to start acquisition: {}", e);
            std::process::exit(1);
        }
    };

    let plot = match spawn_consumer(
        PrintPlot {
            feed: acquisition.position_feed(),
        },
        treadmill::consumer::DEFAULT_RENDER_INTERVAL,
        cancel.clone(),
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start plot: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Recording for {}s...", seconds);
    let start = Instant::now();
    let mut last_report = Instant::now();

    while start.elapsed() < Duration::from_secs(seconds) {
        if acquisition.wait_done(Duration::from_millis(200)) {
            eprintln!("Acquisition ended early");
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(3) {
            let c = acquisition.counts();
            eprintln!(
                "--- {} sync, {} odor on, {} odor off, {} motion, {} unknown ---",
                c.daq_sync, c.odor_on, c.odor_off, c.motion, c.unknown
            );
            last_report = Instant::now();
        }
    }

    cancel.cancel();
    plot.join();

    let report = match acquisition.finish() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Acquisition thread failed: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(fault) = &report.fault {
        eprintln!("Connection fault, exporting partial session: {}", fault);
    }

    let export = report.session.finalize(modulus);
    if !export.is_aligned() {
        eprintln!("No DAQ sync pulse recorded: timestamps are raw");
    }
    match serde_json::to_string_pretty(&export) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize session: {}", e),
    }
}
