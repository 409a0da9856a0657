//! Push-to-pull bridge between the CSV encoder and the object-store upload.
//!
//! The encoder pushes blocks through [`BridgeWriter`] (never blocks, the
//! buffer grows without bound); the uploader pulls chunks from
//! [`BridgeReader`]. Consumed bytes are split off the front of the buffer and
//! never handed out twice.
//!
//! Unbounded growth is acceptable for bounded feeds. Larger inputs would need
//! a bounded queue where the writer waits for the reader.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;

#[derive(Debug)]
enum WriterState {
    Open,
    Ended,
    Failed(String),
}

#[derive(Debug)]
struct Inner {
    buf: BytesMut,
    state: WriterState,
    written: u64,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, state: WriterState) {
        let mut inner = self.lock();
        if matches!(inner.state, WriterState::Open) {
            inner.state = state;
        }
        drop(inner);
        self.notify.notify_one();
    }
}

/// Create a connected writer/reader pair over one shared buffer
pub fn bridge() -> (BridgeWriter, BridgeReader) {
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            buf: BytesMut::new(),
            state: WriterState::Open,
            written: 0,
        }),
        notify: Notify::new(),
    });
    (
        BridgeWriter {
            shared: shared.clone(),
            done: false,
        },
        BridgeReader { shared },
    )
}

/// Push side of the bridge.
///
/// Dropping the writer without calling [`end`](Self::end) fails the reader,
/// so an abandoned encode never looks like a complete stream.
#[derive(Debug)]
pub struct BridgeWriter {
    shared: Arc<Shared>,
    done: bool,
}

impl BridgeWriter {
    /// Append bytes; visible to the reader once this returns
    pub fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut inner = self.shared.lock();
        inner.buf.extend_from_slice(bytes);
        inner.written += bytes.len() as u64;
        drop(inner);
        self.shared.notify.notify_one();
    }

    /// Total bytes pushed so far
    pub fn written(&self) -> u64 {
        self.shared.lock().written
    }

    /// Signal completion; the reader drains what is left, then sees end-of-data
    pub fn end(mut self) {
        self.done = true;
        self.shared.finish(WriterState::Ended);
    }

    /// Abort the stream; the reader fails on its next read
    pub fn fail(mut self, reason: impl Into<String>) {
        self.done = true;
        self.shared.finish(WriterState::Failed(reason.into()));
    }
}

impl io::Write for BridgeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for BridgeWriter {
    fn drop(&mut self) {
        if !self.done {
            self.shared
                .finish(WriterState::Failed("writer dropped before end".to_string()));
        }
    }
}

/// Pull side of the bridge
#[derive(Debug)]
pub struct BridgeReader {
    shared: Arc<Shared>,
}

impl BridgeReader {
    /// Read up to `max_bytes` of unread data.
    ///
    /// Waits while the buffer is empty and the writer is still open.
    /// Returns `Ok(None)` once the writer ended and everything was consumed,
    /// and an error as soon as the writer failed.
    pub async fn read(&mut self, max_bytes: usize) -> io::Result<Option<Bytes>> {
        let max_bytes = max_bytes.max(1);
        loop {
            {
                let mut inner = self.shared.lock();
                if let WriterState::Failed(reason) = &inner.state {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, reason.clone()));
                }
                if !inner.buf.is_empty() {
                    let n = max_bytes.min(inner.buf.len());
                    return Ok(Some(inner.buf.split_to(n).freeze()));
                }
                if matches!(inner.state, WriterState::Ended) {
                    return Ok(None);
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Bytes written but not yet read
    pub fn unread(&self) -> usize {
        self.shared.lock().buf.len()
    }
}
