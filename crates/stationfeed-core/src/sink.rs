//! Output sinks and sink selection: local CSV file, object-store upload, or memory

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::SinkError;
use crate::upload::{ObjectTarget, UploadSink};

/// Buffer size for the local artifact writer (256KB)
const FILE_BUF_SIZE: usize = 256 * 1024;

/// Receives encoded CSV blocks in emission order
pub trait BlockSink {
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkError>;
}

/// What a successful delivery leaves behind for the caller to hand out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// CSV file on the local filesystem, to be streamed
    LocalFile(PathBuf),
    /// CSV bytes held in memory
    Bytes(Bytes),
    /// Time-limited download URL for the uploaded object (redirect target)
    SignedUrl(String),
    /// Stable reference to the uploaded object
    Object { bucket: String, key: String },
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFile(path) => write!(f, "file {}", path.display()),
            Self::Bytes(b) => write!(f, "{} bytes in memory", b.len()),
            Self::SignedUrl(_) => f.write_str("signed URL"),
            Self::Object { bucket, key } => write!(f, "object {bucket}/{key}"),
        }
    }
}

/// Where encoded output goes (deployment mode)
#[derive(Debug, Clone)]
pub enum SinkTarget {
    Local { path: PathBuf },
    Object(ObjectTarget),
    Memory,
}

impl SinkTarget {
    /// Short mode label for logs
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Object(_) => "object",
            Self::Memory => "memory",
        }
    }

    /// Turn a stored artifact into what the caller gets for this run.
    ///
    /// Object references are re-signed when the target has a signer; every
    /// other artifact is handed out as stored.
    pub fn hand_out(&self, stored: &Artifact) -> Result<Artifact, SinkError> {
        match (self, stored) {
            (Self::Object(target), Artifact::Object { .. }) => target.hand_out(),
            _ => Ok(stored.clone()),
        }
    }
}

/// CSV file writer with atomic tmp→rename.
///
/// The previous artifact stays in place until [`finalize`](Self::finalize)
/// renames the completed temp file over it.
pub struct LocalCsvSink {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl fmt::Debug for LocalCsvSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCsvSink")
            .field("final_path", &self.final_path)
            .field("bytes_written", &self.bytes_written)
            .finish_non_exhaustive()
    }
}

impl LocalCsvSink {
    /// Create a sink writing to `<path>.tmp`
    pub fn new(final_path: &Path) -> io::Result<Self> {
        let tmp_path = tmp_path_for(final_path);

        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Clean up stale tmp file
        if tmp_path.exists() {
            log::warn!("Removing stale tmp file: {}", tmp_path.display());
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(FILE_BUF_SIZE, file),
            tmp_path,
            final_path: final_path.to_path_buf(),
            bytes_written: 0,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush, sync and atomically rename tmp → final
    pub fn finalize(self) -> io::Result<PathBuf> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        log::info!(
            "Wrote {} bytes to {}",
            self.bytes_written,
            self.final_path.display()
        );
        Ok(self.final_path)
    }

    /// Discard the partial temp file, leaving any previous artifact untouched
    pub fn abort(self) {
        drop(self.writer);
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            log::warn!("Failed to remove {}: {e}", self.tmp_path.display());
        }
    }
}

impl BlockSink for LocalCsvSink {
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(block)?;
        self.bytes_written += block.len() as u64;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Collects the CSV in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    buf: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buf)
    }
}

impl BlockSink for MemorySink {
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkError> {
        self.buf.extend_from_slice(block);
        Ok(())
    }
}

/// Sink chosen from a [`SinkTarget`]
#[derive(Debug)]
pub enum SelectedSink {
    Local(LocalCsvSink),
    Object(UploadSink),
    Memory(MemorySink),
}

impl SelectedSink {
    /// Open the sink for the configured mode (starts the upload in object mode)
    pub fn open(target: &SinkTarget) -> Result<Self, SinkError> {
        log::debug!("Opening {} sink", target.mode());
        Ok(match target {
            SinkTarget::Local { path } => Self::Local(LocalCsvSink::new(path)?),
            SinkTarget::Object(object) => Self::Object(UploadSink::start(object)),
            SinkTarget::Memory => Self::Memory(MemorySink::new()),
        })
    }

    /// Complete delivery and describe the resulting artifact
    pub fn finish(self) -> Result<Artifact, SinkError> {
        match self {
            Self::Local(sink) => Ok(Artifact::LocalFile(sink.finalize()?)),
            Self::Object(sink) => sink.finish(),
            Self::Memory(sink) => Ok(Artifact::Bytes(sink.into_bytes())),
        }
    }

    /// Abandon delivery; nothing partial becomes visible
    pub fn abort(self) {
        match self {
            Self::Local(sink) => sink.abort(),
            Self::Object(sink) => sink.abort(),
            Self::Memory(_) => {}
        }
    }
}

impl BlockSink for SelectedSink {
    fn write_block(&mut self, block: &[u8]) -> Result<(), SinkError> {
        match self {
            Self::Local(sink) => sink.write_block(block),
            Self::Object(sink) => sink.write_block(block),
            Self::Memory(sink) => sink.write_block(block),
        }
    }
}

/// Write every block to the selected sink, in order, and finish it.
///
/// An error from the block source or the sink aborts delivery.
pub fn deliver<I, E>(blocks: I, target: &SinkTarget) -> Result<Artifact, SinkError>
where
    I: IntoIterator<Item = Result<Vec<u8>, E>>,
    SinkError: From<E>,
{
    let mut sink = SelectedSink::open(target)?;
    for block in blocks {
        let written = block
            .map_err(SinkError::from)
            .and_then(|b| sink.write_block(&b));
        if let Err(e) = written {
            sink.abort();
            return Err(e);
        }
    }
    sink.finish()
}
