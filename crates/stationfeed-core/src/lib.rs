//! Stationfeed Core - Common infrastructure for feed-to-CSV pipelines
//!
//! This crate provides the feed-agnostic pieces: conditional HTTP fetching,
//! batched CSV encoding, the push-to-pull upload bridge and the output sinks.

pub mod bridge;
pub mod conditional;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod progress;
pub mod shard;
pub mod shutdown;
pub mod sink;
pub mod state;
pub mod stream;
pub mod upload;

// Re-exports for convenience
pub use bridge::{BridgeReader, BridgeWriter, bridge};
pub use conditional::{ChangeIndicator, FetchDecision, fetch_if_changed, probe};
pub use encoder::{CsvBatchEncoder, DEFAULT_BATCH_SIZE, EncodedBlocks, encode_blocks};
pub use error::{PipelineError, SinkError};
pub use logging::{IndicatifLogger, default_filter, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_bytes, fmt_num, upgrade_to_bar};
pub use shard::{WorkQueue, into_shards, map_shards_ordered};
pub use shutdown::{is_shutdown_requested, request_shutdown, shutdown_flag, sleep_unless_shutdown};
pub use sink::{Artifact, BlockSink, LocalCsvSink, MemorySink, SelectedSink, SinkTarget, deliver};
pub use state::ValidatorStore;
pub use stream::{
    BodyReader, ByteCounter, CountingReader, HttpConfig, SHARED_RUNTIME, StreamError, http_client, http_config,
    open_body_reader, set_http_config,
};
pub use upload::{DEFAULT_OBJECT_KEY, DEFAULT_URL_EXPIRY, ObjectTarget, UploadSink};
