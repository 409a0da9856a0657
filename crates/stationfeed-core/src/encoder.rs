//! Batched CSV encoding with a run-scoped header.
//!
//! Rows are buffered into fixed-size batches; each sealed batch becomes one
//! CSV block. The header is prefixed to the first block of the run only:
//! a block is the first exactly when the running row total equals its own
//! row count.

use serde::Serialize;

/// Default number of rows per CSV block
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Initial capacity for one encoded block (bytes per row estimate × rows)
const BYTES_PER_ROW_HINT: usize = 160;

/// Accumulates serializable rows and emits CSV blocks
#[derive(Debug)]
pub struct CsvBatchEncoder<R> {
    batch: Vec<R>,
    batch_size: usize,
    rows_emitted: usize,
    blocks_emitted: usize,
}

impl<R: Serialize> CsvBatchEncoder<R> {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch: Vec::with_capacity(batch_size),
            batch_size,
            rows_emitted: 0,
            blocks_emitted: 0,
        }
    }

    /// Buffer a row; returns the encoded block when the batch fills up
    pub fn push(&mut self, row: R) -> Result<Option<Vec<u8>>, csv::Error> {
        self.batch.push(row);
        if self.batch.len() >= self.batch_size {
            return self.seal().map(Some);
        }
        Ok(None)
    }

    /// Encode whatever is still buffered (end of input)
    pub fn finish(&mut self) -> Result<Option<Vec<u8>>, csv::Error> {
        if self.batch.is_empty() {
            return Ok(None);
        }
        self.seal().map(Some)
    }

    /// Rows buffered in the open batch
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Rows already encoded into blocks
    pub fn rows_emitted(&self) -> usize {
        self.rows_emitted
    }

    pub fn blocks_emitted(&self) -> usize {
        self.blocks_emitted
    }

    fn seal(&mut self) -> Result<Vec<u8>, csv::Error> {
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.rows_emitted += batch.len();
        let with_header = self.rows_emitted == batch.len();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(with_header)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::with_capacity(batch.len() * BYTES_PER_ROW_HINT));
        for row in &batch {
            writer.serialize(row)?;
        }
        let block = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;

        self.blocks_emitted += 1;
        log::debug!(
            "CSV block {}: {} rows, {} bytes{}",
            self.blocks_emitted,
            batch.len(),
            block.len(),
            if with_header { " (with header)" } else { "" }
        );
        Ok(block)
    }
}

/// Lazily encode a row iterator into CSV blocks
pub fn encode_blocks<R, I>(rows: I, batch_size: usize) -> EncodedBlocks<R, I::IntoIter>
where
    R: Serialize,
    I: IntoIterator<Item = R>,
{
    EncodedBlocks {
        rows: rows.into_iter(),
        encoder: CsvBatchEncoder::new(batch_size),
        done: false,
    }
}

/// Iterator of CSV blocks, see [`encode_blocks`]
#[derive(Debug)]
pub struct EncodedBlocks<R, I> {
    rows: I,
    encoder: CsvBatchEncoder<R>,
    done: bool,
}

impl<R: Serialize, I: Iterator<Item = R>> Iterator for EncodedBlocks<R, I> {
    type Item = Result<Vec<u8>, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for row in self.rows.by_ref() {
            match self.encoder.push(row) {
                Ok(Some(block)) => return Some(Ok(block)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        self.encoder.finish().transpose()
    }
}
