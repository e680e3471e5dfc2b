//! Record export writers

use crate::store::shard::read_shard;
use crate::store::{shard, StoreError};
use crate::MatchRecord;
use std::path::Path;
use tracing::info;

pub mod csv;

pub use self::csv::CsvRecordWriter;

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),

    /// Source shards could not be read
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Generic output writer
pub trait OutputWriter {
    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;

    /// Close the writer and finalize output
    fn close(self) -> OutputResult<()>;
}

/// Writer for match records
pub trait RecordsWriter: OutputWriter {
    /// Write a single record
    fn write_record(&mut self, record: &MatchRecord) -> OutputResult<()>;

    /// Write several records
    fn write_records(&mut self, records: &[MatchRecord]) -> OutputResult<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }
}

/// Copy every record from the shards under `dir` to `writer`, shard by shard.
///
/// Returns the number of records written. Any unreadable shard is an error.
pub fn export_shards<W: RecordsWriter>(dir: &Path, prefix: &str, writer: &mut W) -> OutputResult<u64> {
    let mut written = 0u64;
    for (index, path) in shard::list_shards(dir, prefix)? {
        let records: Vec<MatchRecord> = read_shard(&path)?;
        writer.write_records(&records)?;
        written += records.len() as u64;
        info!(shard = index, records = records.len(), "Shard exported");
    }
    writer.flush()?;
    Ok(written)
}
