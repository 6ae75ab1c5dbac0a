use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quadbot_runtime::config::{CALIBRATION_PATH, LOOP_HZ, SERVO_ENABLED, SERVO_PORT, SETTLE_DELAY};
use quadbot_runtime::runtime::RuntimeOptions;

/// Quadruped motion runtime
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Serial port of the Feetech servo bus
    #[arg(long, default_value = SERVO_PORT)]
    port: String,

    /// Calibration image (trim and reversal flags)
    #[arg(long, default_value = CALIBRATION_PATH)]
    calibration: PathBuf,

    /// Engine ticks per second
    #[arg(long, default_value_t = LOOP_HZ, value_parser = clap::value_parser!(u64).range(1..=1000))]
    loop_hz: u64,

    /// Settle delay after each servo frame, in milliseconds
    #[arg(long, default_value_t = SETTLE_DELAY.as_millis() as u64)]
    settle_ms: u64,

    /// Drive simulated servos instead of the bus
    #[arg(long, default_value_t = !SERVO_ENABLED)]
    simulate: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let options = RuntimeOptions {
        servo_port: (!args.simulate).then_some(args.port),
        calibration_path: args.calibration,
        loop_hz: args.loop_hz,
        settle: Duration::from_millis(args.settle_ms),
    };

    if let Err(e) = quadbot_runtime::runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
