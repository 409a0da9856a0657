//! Refresh coordinator: probe → fetch → filter → encode → deliver → commit

use std::sync::atomic::Ordering;
use std::time::Instant;

use stationfeed_core::{
    Artifact, BlockSink, ChangeIndicator, CsvBatchEncoder, FetchDecision, PipelineError,
    ProgressContext, SelectedSink, SharedProgress, SinkError, ValidatorStore, fetch_if_changed,
    upgrade_to_bar,
};

use crate::config::Config;
use crate::feed::for_each_station;
use crate::station::{RawStation, StationRow};
use crate::stats::RunStats;
use crate::transform::FilterRenameStage;

/// Result of one [`Refresher::refresh`] call
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// False when the feed was unchanged and the previous artifact was reused
    pub changed: bool,
    /// What to hand the caller for this run (signed per run for object targets)
    pub artifact: Artifact,
    /// Indicator the artifact corresponds to (for ETag exposure upstream)
    pub indicator: ChangeIndicator,
    pub stats: RunStats,
}

/// Owns the validator store and runs refreshes against one feed.
///
/// `refresh` takes `&mut self`: runs are serialized by construction.
/// Share across threads behind a `Mutex` if needed.
pub struct Refresher {
    config: Config,
    store: ValidatorStore,
    progress: SharedProgress,
}

impl Refresher {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: ValidatorStore::new(),
            progress: SharedProgress::new(ProgressContext::hidden()),
        }
    }

    /// Show download progress through the given context
    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ValidatorStore {
        &self.store
    }

    /// Produce a current artifact, downloading only if the feed changed.
    ///
    /// On error the store keeps the previous indicator and artifact. The
    /// store holds the reusable artifact; the outcome carries what to hand
    /// out now (a freshly signed URL when the object target can sign).
    pub fn refresh(&mut self) -> Result<RefreshOutcome, PipelineError> {
        let start = Instant::now();
        let url = self.config.feed_url.clone();
        self.drop_missing_artifact();

        let stage = self.progress.stage_line("probe");
        stage.set_message(url.clone());
        let decision = fetch_if_changed(&url, &self.store);
        stage.finish_and_clear();

        let (indicator, body, counter, content_length) = match decision? {
            FetchDecision::Unchanged {
                indicator,
                artifact,
            } => {
                log::info!("Reusing {artifact}");
                let artifact = self.config.sink.hand_out(&artifact)?;
                let stats = RunStats {
                    elapsed: start.elapsed(),
                    ..Default::default()
                };
                stats.log(false);
                return Ok(RefreshOutcome {
                    changed: false,
                    artifact,
                    indicator,
                    stats,
                });
            }
            FetchDecision::Changed {
                indicator,
                body,
                counter,
                content_length,
            } => (indicator, body, counter, content_length),
        };

        let pb = self.progress.transfer_bar("feed");
        if let Some(total) = content_length {
            upgrade_to_bar(&pb, total);
        }
        pb.set_message("parsing...");

        let mut pipeline = RowPipeline::open(&self.config)?;
        let parsed = for_each_station(pb.wrap_read(body), |station| pipeline.push(station));
        pb.finish_and_clear();

        let items_scanned = match parsed {
            Ok(n) => n,
            Err(e) => {
                log::error!("Refresh failed ({}): {e}", e.kind());
                pipeline.abort();
                return Err(e);
            }
        };

        let stage = self.progress.stage_line("deliver");
        stage.set_message(self.config.sink.mode());
        let finished = pipeline.finish();
        stage.finish_and_clear();
        let (stored, totals) = finished.inspect_err(|e| {
            log::error!("Refresh failed ({}): {e}", e.kind());
        })?;

        let stats = RunStats {
            items_scanned,
            rows_kept: totals.rows,
            blocks: totals.blocks,
            bytes_in: counter.load(Ordering::Relaxed),
            bytes_out: totals.bytes,
            elapsed: start.elapsed(),
        };
        stats.log(true);

        let artifact = self.config.sink.hand_out(&stored)?;
        self.store.commit(indicator.clone(), stored);
        Ok(RefreshOutcome {
            changed: true,
            artifact,
            indicator,
            stats,
        })
    }

    /// A deleted local file can't be reused; forget it so the next probe refetches
    fn drop_missing_artifact(&mut self) {
        let missing = match self.store.artifact() {
            Some(Artifact::LocalFile(path)) if !path.exists() => Some(path.clone()),
            _ => None,
        };
        if let Some(path) = missing {
            log::warn!("{} disappeared, forcing refetch", path.display());
            self.store.invalidate();
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    rows: usize,
    blocks: usize,
    bytes: u64,
}

/// Filter → encoder → sink for one run
struct RowPipeline {
    stage: FilterRenameStage,
    encoder: CsvBatchEncoder<StationRow>,
    sink: SelectedSink,
    window: Vec<RawStation>,
    window_size: usize,
    workers: usize,
    shard_size: usize,
    totals: Totals,
}

impl RowPipeline {
    fn open(config: &Config) -> Result<Self, SinkError> {
        let window_size = config.window_size();
        Ok(Self {
            stage: FilterRenameStage::new(config.max_capacity),
            encoder: CsvBatchEncoder::new(config.batch_size),
            sink: SelectedSink::open(&config.sink)?,
            window: Vec::with_capacity(window_size),
            window_size,
            workers: config.workers,
            shard_size: config.shard_size,
            totals: Totals::default(),
        })
    }

    fn push(&mut self, station: RawStation) -> Result<(), PipelineError> {
        if self.window_size == 0 {
            if let Some(row) = self.stage.apply(station) {
                self.emit(row)?;
            }
            return Ok(());
        }
        self.window.push(station);
        if self.window.len() >= self.window_size {
            self.flush_window()?;
        }
        Ok(())
    }

    fn flush_window(&mut self) -> Result<(), PipelineError> {
        if self.window.is_empty() {
            return Ok(());
        }
        let window = std::mem::replace(&mut self.window, Vec::with_capacity(self.window_size));
        for row in self.stage.apply_sharded(window, self.workers, self.shard_size) {
            self.emit(row)?;
        }
        Ok(())
    }

    fn emit(&mut self, row: StationRow) -> Result<(), PipelineError> {
        self.totals.rows += 1;
        if let Some(block) = self.encoder.push(row).map_err(SinkError::from)? {
            self.write(&block)?;
        }
        Ok(())
    }

    fn write(&mut self, block: &[u8]) -> Result<(), PipelineError> {
        self.sink.write_block(block)?;
        self.totals.blocks += 1;
        self.totals.bytes += block.len() as u64;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PipelineError> {
        self.flush_window()?;
        if let Some(block) = self.encoder.finish().map_err(SinkError::from)? {
            self.write(&block)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(Artifact, Totals), PipelineError> {
        if let Err(e) = self.drain() {
            self.sink.abort();
            return Err(e);
        }
        let artifact = self.sink.finish()?;
        log::info!(
            "Delivered {} rows in {} blocks to {artifact}",
            self.totals.rows,
            self.totals.blocks
        );
        Ok((artifact, self.totals))
    }

    fn abort(self) {
        self.sink.abort();
    }
}
