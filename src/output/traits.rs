//! Record sink trait and error types
//!
//! A sink consumes the classified records of a run. Records arrive one at a
//! time; a later `mark_subclassified` may refine a diagnosis that was
//! already emitted.

use crate::model::ClassifiedRecord;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record channel closed before the run finished")]
    ChannelClosed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Consumer of classified records
///
/// Calls are serialized by the caller, so implementations need no locking.
pub trait RecordSink: Send {
    /// Writes one record
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()>;

    /// Sets `has_subclassification` on an already emitted diagnosis
    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()>;

    /// Called once after the last record
    fn end(&mut self) -> OutputResult<()>;

    /// Called instead of `end` when the run stops early
    ///
    /// Persists what was received so far so a resumed run can reopen the
    /// output with `append` and continue from it.
    fn checkpoint(&mut self) -> OutputResult<()> {
        Ok(())
    }
}
