//! Fetch subcommand - one refresh of the station feed

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use object_store::aws::AmazonS3Builder;
use stationfeed_core::{Artifact, ObjectTarget, SharedProgress, SinkTarget};
use stationfeed_gbfs::{RefreshOutcome, Refresher};

use crate::config::{Config, FILE_OUTPUT_ENV, OutputChoice};

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Feed URL (station_information.json)
    #[arg(long)]
    pub url: Option<String>,

    /// Keep stations with capacity below this value
    #[arg(long)]
    pub max_capacity: Option<u32>,

    /// Rows per CSV block
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Number of filter workers (1 = inline)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Write the CSV to this local file
    #[arg(short, long, conflicts_with_all = ["bucket", "stdout"])]
    pub output: Option<PathBuf>,

    /// Upload the CSV to this bucket (credentials from AWS_* environment)
    #[arg(long, conflicts_with = "stdout")]
    pub bucket: Option<String>,

    /// Object key for uploads
    #[arg(long)]
    pub key: Option<String>,

    /// Write the CSV to stdout instead of a file or bucket
    #[arg(long)]
    pub stdout: bool,
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let mut refresher = build_refresher(&args, config, progress)?;
    let outcome = refresher.refresh()?;
    report(&outcome, progress)
}

/// Merge CLI flags over the file config and construct the refresher
pub fn build_refresher(
    args: &FetchArgs,
    config: &Config,
    progress: &SharedProgress,
) -> Result<Refresher> {
    let sink = sink_target(args, config)?;
    let gbfs = stationfeed_gbfs::Config {
        feed_url: args.url.clone().unwrap_or_else(|| config.feed.url.clone()),
        max_capacity: args.max_capacity.unwrap_or(config.feed.max_capacity),
        batch_size: args.batch_size.unwrap_or(config.feed.batch_size),
        workers: args.workers.unwrap_or(config.workers.default).max(1),
        shard_size: config.workers.shard_size,
        sink,
    };
    log::info!(
        "stationfeed: url={}, max_capacity={}, batch_size={}, workers={}, output={}",
        gbfs.feed_url,
        gbfs.max_capacity,
        gbfs.batch_size,
        gbfs.workers,
        gbfs.sink.mode()
    );
    Ok(Refresher::new(gbfs).with_progress(progress.clone()))
}

fn sink_target(args: &FetchArgs, config: &Config) -> Result<SinkTarget> {
    if args.stdout {
        return Ok(SinkTarget::Memory);
    }
    if let Some(path) = &args.output {
        return Ok(SinkTarget::Local { path: path.clone() });
    }
    let choice = match &args.bucket {
        Some(bucket) => OutputChoice::Object {
            bucket: bucket.clone(),
        },
        None => config
            .output
            .resolve(std::env::var(FILE_OUTPUT_ENV).ok().as_deref()),
    };
    match choice {
        OutputChoice::Local(path) => Ok(SinkTarget::Local { path }),
        OutputChoice::Object { bucket } => {
            let key = args.key.clone().unwrap_or_else(|| config.output.key.clone());
            object_target(&bucket, key, config).map(SinkTarget::Object)
        }
    }
}

fn object_target(bucket: &str, key: String, config: &Config) -> Result<ObjectTarget> {
    let s3 = Arc::new(
        AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .with_context(|| format!("Cannot configure object store for bucket {bucket}"))?,
    );
    let target = ObjectTarget::new(s3.clone(), bucket)
        .with_key(key)
        .with_url_expiry(Duration::from_secs(config.output.url_expiry_secs));
    Ok(if config.output.presign {
        target.with_signer(s3)
    } else {
        target
    })
}

/// Summary on stderr, the artifact handle (or CSV bytes) on stdout
pub fn report(outcome: &RefreshOutcome, progress: &SharedProgress) -> Result<()> {
    if progress.is_tty() {
        progress.println(outcome.stats.format_table(outcome.changed));
    }

    let mut stdout = std::io::stdout().lock();
    match &outcome.artifact {
        Artifact::Bytes(bytes) => stdout.write_all(bytes),
        Artifact::LocalFile(path) => writeln!(stdout, "{}", path.display()),
        Artifact::SignedUrl(url) => writeln!(stdout, "{url}"),
        Artifact::Object { bucket, key } => writeln!(stdout, "s3://{bucket}/{key}"),
    }
    .context("Failed to write to stdout")?;
    stdout.flush().context("Failed to write to stdout")
}
