//! Object-store upload driven through the push-to-pull bridge.
//!
//! The caller's thread pushes CSV blocks into a [`BridgeWriter`]; a task on
//! the shared runtime pulls them from the [`BridgeReader`] and streams them
//! into a multipart upload. The object only appears once the upload
//! completes, so an aborted run never replaces the previous object.

use std::sync::Arc;
use std::time::Duration;

use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, WriteMultipart};
use tokio::task::JoinHandle;

use crate::bridge::{BridgeReader, BridgeWriter, bridge};
use crate::error::SinkError;
use crate::sink::{Artifact, BlockSink};
use crate::stream::SHARED_RUNTIME;

/// Default lifetime of a signed download URL (5 minutes)
pub const DEFAULT_URL_EXPIRY: Duration = Duration::from_secs(300);

/// Default object key for the artifact
pub const DEFAULT_OBJECT_KEY: &str = "data.csv";

/// Max bytes pulled from the bridge per read (1MB)
const READ_CHUNK: usize = 1024 * 1024;

/// Max multipart parts in flight before the uploader waits
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// Bucket/key destination plus the capabilities to write and sign it
#[derive(Debug, Clone)]
pub struct ObjectTarget {
    pub store: Arc<dyn ObjectStore>,
    /// When present, delivery returns a signed URL instead of a plain reference
    pub signer: Option<Arc<dyn Signer>>,
    pub bucket: String,
    pub key: String,
    pub url_expiry: Duration,
}

impl ObjectTarget {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            signer: None,
            bucket: bucket.into(),
            key: DEFAULT_OBJECT_KEY.to_string(),
            url_expiry: DEFAULT_URL_EXPIRY,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_url_expiry(mut self, expiry: Duration) -> Self {
        self.url_expiry = expiry;
        self
    }

    fn path(&self) -> ObjectPath {
        ObjectPath::from(self.key.as_str())
    }

    /// Stable bucket/key reference; this is what gets stored between runs
    pub fn reference(&self) -> Artifact {
        Artifact::Object {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
        }
    }

    /// What to hand out for the uploaded object right now.
    ///
    /// With a signer this signs a fresh URL on every call, so a reused
    /// upload never hands out an expired link.
    pub fn hand_out(&self) -> Result<Artifact, SinkError> {
        let Some(signer) = &self.signer else {
            return Ok(self.reference());
        };
        let url = SHARED_RUNTIME.handle().block_on(signer.signed_url(
            reqwest::Method::GET,
            &self.path(),
            self.url_expiry,
        ))?;
        log::debug!(
            "Signed URL for {} valid {}s",
            self.key,
            self.url_expiry.as_secs()
        );
        Ok(Artifact::SignedUrl(url.to_string()))
    }
}

/// Sink that streams blocks into an object-store upload
pub struct UploadSink {
    writer: BridgeWriter,
    /// Taken once the task has been joined early (it failed mid-stream)
    handle: Option<JoinHandle<Result<u64, SinkError>>>,
    target: ObjectTarget,
}

impl std::fmt::Debug for UploadSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadSink")
            .field("bucket", &self.target.bucket)
            .field("key", &self.target.key)
            .field("written", &self.writer.written())
            .finish_non_exhaustive()
    }
}

impl UploadSink {
    /// Start the upload task; blocks written afterwards flow straight into it
    pub fn start(target: &ObjectTarget) -> Self {
        let (writer, reader) = bridge();
        let handle = SHARED_RUNTIME.spawn(upload_stream(target.store.clone(), target.path(), reader));
        log::info!("Uploading to {}/{}", target.bucket, target.key);
        Self {
            writer,
            handle: Some(handle),
            target: target.clone(),
        }
    }

    /// End the stream and wait for the upload to complete.
    ///
    /// Always returns the stable object reference; signing is left to
    /// [`ObjectTarget::hand_out`].
    pub fn finish(self) -> Result<Artifact, SinkError> {
        let Self {
            writer,
            handle,
            target,
        } = self;
        writer.end();

        let handle = handle.ok_or_else(|| SinkError::Closed("upload task already stopped".to_string()))?;
        let total = join(handle)?;
        log::info!(
            "Uploaded {total} bytes to {}/{}",
            target.bucket,
            target.key
        );
        Ok(target.reference())
    }

    /// Fail the stream so the uploader aborts the multipart upload
    pub fn abort(self) {
        self.writer.fail("delivery aborted");
        let Some(handle) = self.handle else {
            return;
        };
        match SHARED_RUNTIME.handle().block_on(handle) {
            Ok(Err(e)) => log::debug!("Upload of {} aborted: {e}", self.target.key),
            Ok(Ok(_)) => log::warn!("Upload of {} completed despite abort", self.target.key),
            Err(e) => log::warn!("Upload task for {} failed: {e}", self.target.key),
        }
    }
}

impl BlockSink for UploadSink {
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkError> {
        let Some(handle) = &self.handle else {
            return Err(SinkError::Closed("upload task already stopped".to_string()));
        };
        if handle.is_finished() {
            // The task only stops early on failure; surface its error
            if let Some(handle) = self.handle.take() {
                join(handle)?;
            }
            return Err(SinkError::Closed(
                "upload completed before input ended".to_string(),
            ));
        }
        self.writer.push(block);
        Ok(())
    }
}

/// Wait for the upload task and flatten its result
fn join(handle: JoinHandle<Result<u64, SinkError>>) -> Result<u64, SinkError> {
    SHARED_RUNTIME
        .handle()
        .block_on(handle)
        .map_err(|e| SinkError::Closed(e.to_string()))?
}

/// Pull from the bridge until end-of-data and stream into a multipart upload
async fn upload_stream(
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    mut reader: BridgeReader,
) -> Result<u64, SinkError> {
    let upload = store.put_multipart(&path).await?;
    let mut write = WriteMultipart::new(upload);
    let mut total = 0u64;

    loop {
        match reader.read(READ_CHUNK).await {
            Ok(Some(chunk)) => {
                write.wait_for_capacity(MAX_IN_FLIGHT_PARTS).await?;
                write.write(&chunk);
                total += chunk.len() as u64;
            }
            Ok(None) => break,
            Err(e) => {
                if let Err(abort_err) = write.abort().await {
                    log::warn!("Failed to abort multipart upload of {path}: {abort_err}");
                }
                return Err(SinkError::Io(e));
            }
        }
    }

    write.finish().await?;
    Ok(total)
}
