//! Output module: record sinks and run reports
//!
//! This module handles:
//! - Streaming classified records to a sink (JSON Lines, JSON directory,
//!   CSV, SQLite, memory)
//! - The two-phase `has_subclassification` update protocol
//! - Validation findings and the markdown run report
//! - Statistics read back from the run-state database

mod csv_sink;
mod json_dir;
mod jsonl;
mod markdown;
mod memory;
mod report;
mod sqlite_output;
pub mod stats;
mod traits;

pub use csv_sink::CsvSink;
pub use json_dir::JsonDirectorySink;
pub use jsonl::JsonLinesSink;
pub use markdown::{format_markdown_report, write_markdown_report};
pub use memory::{CollectedRecords, MemorySink};
pub use report::{CrawlReport, FailedUrl, MissingLink, UnresolvedParent, ValidationReport};
pub use sqlite_output::SqliteSink;
pub use stats::{load_statistics, print_statistics, HarvestStatistics};
pub use traits::{OutputError, OutputResult, RecordSink};

use crate::config::{OutputConfig, OutputFormat};
use crate::model::ClassifiedRecord;
use std::path::Path;
use tokio::sync::mpsc;

/// Message from the crawl workers to the sink task
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Record(ClassifiedRecord),
    /// A diagnosis emitted earlier gained its first child diagnosis
    Subclassified { diagnosis_id: u32 },
    /// The crawl finished; sent exactly once
    End,
}

/// What the sink task processed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub records: u64,
    pub updates: u64,
    pub ended: bool,
}

/// Opens the sink selected by the output configuration
///
/// With `append`, file sinks keep what an earlier run of the same harvest
/// already wrote. `release_id` fills the release column of formats that
/// repeat it on every row.
pub fn create_sink(
    config: &OutputConfig,
    release_id: &str,
    append: bool,
) -> OutputResult<Box<dyn RecordSink>> {
    let path = Path::new(&config.path);
    tracing::debug!(
        "Opening {} sink at {} (append: {})",
        config.format.as_str(),
        path.display(),
        append
    );

    Ok(match config.format {
        OutputFormat::Jsonl => Box::new(JsonLinesSink::create(path, append)?),
        OutputFormat::Json => Box::new(JsonDirectorySink::open(path, append)?),
        OutputFormat::Csv => Box::new(CsvSink::create(path, append, release_id)?),
        OutputFormat::Sqlite => Box::new(SqliteSink::open(path, append)?),
    })
}

/// Feeds events into `sink` until `End` arrives or every sender is gone
///
/// Blocking: run it on a blocking thread. When the senders go away without
/// `End`, the sink is checkpointed but left unfinished.
pub fn drain(
    mut sink: Box<dyn RecordSink>,
    mut events: mpsc::Receiver<SinkEvent>,
) -> OutputResult<SinkSummary> {
    let mut summary = SinkSummary::default();

    while let Some(event) = events.blocking_recv() {
        match event {
            SinkEvent::Record(record) => {
                sink.emit(&record)?;
                summary.records += 1;
            }
            SinkEvent::Subclassified { diagnosis_id } => {
                sink.mark_subclassified(diagnosis_id)?;
                summary.updates += 1;
            }
            SinkEvent::End => {
                sink.end()?;
                summary.ended = true;
                break;
            }
        }
    }

    if !summary.ended {
        sink.checkpoint()?;
        tracing::warn!("Record channel closed without end of run; output is incomplete");
    }

    Ok(summary)
}
