//! stationfeed - bike-share station feed to CSV
//!
//! Downloads a GBFS station_information feed when its ETag changes, keeps
//! stations below a capacity threshold and delivers them as CSV to a local
//! file, an S3 bucket or stdout.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::{Config, FILE_OUTPUT_ENV};

#[derive(Parser)]
#[command(name = "stationfeed")]
#[command(about = "Bike-share station feed to CSV")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./stationfeed.toml or ~/.config/stationfeed/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Connect timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Refresh once and print the artifact location
    Fetch(cmd::fetch::FetchArgs),
    /// Refresh repeatedly until interrupted
    Watch(cmd::watch::WatchArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = Arc::new(stationfeed_core::ProgressContext::new());

    // TTY: warn unless --debug, progress bars show activity.
    // Non-TTY: info, logs are the only progress indicator.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    stationfeed_core::init_logging(quiet, cli.debug, multi)?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    stationfeed_core::set_http_config(stationfeed_core::HttpConfig {
        connect_timeout: std::time::Duration::from_secs(
            cli.connect_timeout.unwrap_or(config.http.connect_timeout),
        ),
        read_timeout: std::time::Duration::from_secs(
            cli.read_timeout.unwrap_or(config.http.read_timeout),
        ),
    });

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Watch(args) => cmd::watch::run(args, &config, &progress),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let file_output = std::env::var(FILE_OUTPUT_ENV).ok();
            let output = match config.output.resolve(file_output.as_deref()) {
                config::OutputChoice::Local(path) => format!("local {}", path.display()),
                config::OutputChoice::Object { bucket } => {
                    format!("object s3://{bucket}/{}", config.output.key)
                }
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Feed URL", &config.feed.url]);
            table.add_row(vec!["Max capacity", &format!("< {}", config.feed.max_capacity)]);
            table.add_row(vec!["Batch size", &config.feed.batch_size.to_string()]);
            table.add_row(vec!["Output", &output]);
            table.add_row(vec![
                "FILE_OUTPUT",
                file_output.as_deref().unwrap_or("not set"),
            ]);
            table.add_row(vec![
                "Signed URLs",
                &if config.output.presign {
                    format!("{}s expiry", config.output.url_expiry_secs)
                } else {
                    "off".to_string()
                },
            ]);
            table.add_row(vec![
                "Workers",
                &format!(
                    "{} (shard size {})",
                    config.workers.default, config.workers.shard_size
                ),
            ]);
            table.add_row(vec![
                "Connect timeout",
                &format!("{}s", config.http.connect_timeout),
            ]);
            table.add_row(vec![
                "Read timeout",
                &format!("{}s", config.http.read_timeout),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
