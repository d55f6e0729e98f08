//! # Pressure Bench - Main Entry Point
//!
//! Runs one load test against the simulated operation and prints the report.
//!
//! 1. **Parse arguments** and initialize logging
//! 2. **Build the configuration**, rejecting invalid values before any work
//! 3. **Run the load** through `LoadDriver`
//! 4. **Render** the text report to stdout, and JSON to a file when asked

use anyhow::Result;
use clap::Parser;
use pressure_bench::{
    cli::Args,
    logging::init_logging,
    report::{render_text, write_json},
    LoadConfig, LoadDriver, SimulatedInvoker,
};
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until exit so the file appender flushes.
    let _log_guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref())?;

    info!("Starting Pressure Bench v{}", pressure_bench::VERSION);
    debug!("Configuration: {:?}", args);

    let config = LoadConfig::from_args(&args)?;
    let invoker = SimulatedInvoker::new(args.error_rate).with_time_scale(args.time_scale);
    let driver = LoadDriver::new(config, Arc::new(invoker))?;
    debug!(
        "Issuing {} of {} requested calls",
        driver.config().effective_calls(),
        driver.config().total_calls
    );

    let report = driver.run().await;

    println!("{}", render_text(&report, args.language));

    if let Some(path) = &args.output_file {
        write_json(&report, path)?;
    }

    Ok(())
}
