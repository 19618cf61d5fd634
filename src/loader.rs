//! Batched bulk loader for newline-delimited JSON.
//!
//! Each line is decoded on its own. Lines that fail to decode are logged,
//! counted and skipped; they never abort the run and never touch the batch
//! they would have joined. Decoded documents are stored exactly as parsed.
//! A failed bulk insert is fatal.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{DocumentStore, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Longest prefix of a bad line echoed into the log.
const BAD_LINE_PREVIEW: usize = 120;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read line {line}: {source}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("bulk insert of {batch_len} documents failed: {source}")]
    Insert {
        batch_len: usize,
        #[source]
        source: StoreError,
    },
}

/// Outcome of a load. `inserted + decode_errors == lines_read` always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub lines_read: u64,
    pub inserted: u64,
    pub decode_errors: u64,
    /// Number of bulk-insert calls issued.
    pub batches: u64,
}

/// Accumulates decoded documents and flushes them in fixed-size batches.
pub struct Loader<'a, S: DocumentStore + ?Sized> {
    store: &'a mut S,
    collection: String,
    batch_size: usize,
    batch: Vec<Value>,
    report: LoadReport,
}

impl<'a, S: DocumentStore + ?Sized> Loader<'a, S> {
    pub fn new(
        store: &'a mut S,
        collection: impl Into<String>,
        batch_size: usize,
    ) -> Result<Self, LoadError> {
        if batch_size == 0 {
            return Err(LoadError::InvalidBatchSize);
        }
        Ok(Self {
            store,
            collection: collection.into(),
            batch_size,
            batch: Vec::with_capacity(batch_size),
            report: LoadReport::default(),
        })
    }

    /// Feed one raw line (without its terminator). Returns `Ok(false)` when the
    /// line was skipped as undecodable.
    pub fn push_line(&mut self, raw: &[u8]) -> Result<bool, LoadError> {
        self.report.lines_read += 1;
        let line_no = self.report.lines_read;
        match serde_json::from_slice::<Value>(raw) {
            Ok(doc) => {
                self.batch.push(doc);
                if self.batch.len() >= self.batch_size {
                    self.flush()?;
                }
                Ok(true)
            }
            Err(e) => {
                self.report.decode_errors += 1;
                let text = String::from_utf8_lossy(raw);
                let preview: String = text.trim().chars().take(BAD_LINE_PREVIEW).collect();
                warn!(line = line_no, error = %e, content = %preview, "Error decoding JSON line");
                Ok(false)
            }
        }
    }

    fn flush(&mut self) -> Result<(), LoadError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let docs = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        let batch_len = docs.len();
        let inserted = self
            .store
            .insert_many(&self.collection, docs)
            .map_err(|source| LoadError::Insert { batch_len, source })?;
        self.report.inserted += inserted as u64;
        self.report.batches += 1;
        debug!(
            batch = self.report.batches,
            size = batch_len,
            total = self.report.inserted,
            "Inserted batch"
        );
        Ok(())
    }

    /// Flush the trailing partial batch and return the report.
    pub fn finish(mut self) -> Result<LoadReport, LoadError> {
        self.flush()?;
        Ok(self.report)
    }
}

/// Load every line of `reader` into `collection`.
pub fn load_reader<R: BufRead, S: DocumentStore + ?Sized>(
    mut reader: R,
    store: &mut S,
    collection: &str,
    batch_size: usize,
) -> Result<LoadReport, LoadError> {
    let mut loader = Loader::new(store, collection, batch_size)?;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| LoadError::Read {
                line: loader.report.lines_read + 1,
                source,
            })?;
        if n == 0 {
            break;
        }
        let line = strip_line_ending(&buf);
        loader.push_line(line)?;
    }
    let report = loader.finish()?;
    info!(
        collection,
        lines = report.lines_read,
        inserted = report.inserted,
        skipped = report.decode_errors,
        batches = report.batches,
        "Load finished"
    );
    Ok(report)
}

/// Open the input file for [`load_reader`].
///
/// Kept separate so callers can fail on a missing input before they create
/// any store state.
pub fn open_input(path: &Path) -> Result<BufReader<File>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Opened input");
    Ok(BufReader::new(file))
}

fn strip_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
