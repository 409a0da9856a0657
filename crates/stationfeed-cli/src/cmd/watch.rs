//! Watch subcommand - refresh on an interval until interrupted

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use stationfeed_core::{SharedProgress, is_shutdown_requested, shutdown_flag, sleep_unless_shutdown};

use crate::cmd::fetch::{self, FetchArgs};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub fetch: FetchArgs,

    /// Seconds between refreshes
    #[arg(short, long, default_value_t = 60)]
    pub interval: u64,
}

pub fn run(args: WatchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    setup_signal_handler()?;
    let mut refresher = fetch::build_refresher(&args.fetch, config, progress)?;
    let interval = Duration::from_secs(args.interval.max(1));

    let mut runs = 0usize;
    let mut failures = 0usize;
    while !is_shutdown_requested() {
        runs += 1;
        match refresher.refresh() {
            Ok(outcome) => {
                if outcome.changed {
                    fetch::report(&outcome, progress)?;
                }
            }
            Err(e) => {
                failures += 1;
                log::error!("Run {runs} failed, previous artifact kept: {e}");
            }
        }
        if !sleep_unless_shutdown(interval) {
            break;
        }
    }

    log::info!("Stopped after {runs} runs ({failures} failed)");
    Ok(())
}

/// First signal requests a graceful stop; a second one exits immediately
fn setup_signal_handler() -> Result<()> {
    // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
    unsafe {
        for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
        }
    }
    Ok(())
}
