//! Streaming CSV sink
//!
//! One row per record, with `KIND` naming its level and the columns that
//! level does not carry left empty. List fields are joined with `; `. A
//! subclassification flip is appended as its own `update` row holding only
//! the diagnosis id and the new flag, the same way the JSON Lines sink does
//! it, so rows already written are never rewritten:
//!
//! ```text
//! update,7,,,,,,,,true,,,,,,,
//! ```

use crate::model::ClassifiedRecord;
use crate::output::traits::{OutputError, OutputResult, RecordSink};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Default, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "KIND")]
    kind: &'a str,
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "CODE")]
    code: &'a str,
    #[serde(rename = "TITLE")]
    title: &'a str,
    #[serde(rename = "DEFINITION")]
    definition: &'a str,
    #[serde(rename = "CHAPTER_ID")]
    chapter_id: Option<u32>,
    #[serde(rename = "SECTION_ID")]
    section_id: Option<u32>,
    #[serde(rename = "SUBSECTION_ID")]
    subsection_id: Option<u32>,
    #[serde(rename = "PARENT_DIAGNOSIS_ID")]
    parent_diagnosis_id: Option<u32>,
    #[serde(rename = "HAS_SUBCLASSIFICATION")]
    has_subclassification: Option<bool>,
    #[serde(rename = "IS_INFECTIOUS")]
    is_infectious: Option<bool>,
    #[serde(rename = "SYNONYMS")]
    synonyms: String,
    #[serde(rename = "INCLUSIONS")]
    inclusions: String,
    #[serde(rename = "EXCLUSIONS")]
    exclusions: String,
    #[serde(rename = "CODING_NOTES")]
    coding_notes: &'a str,
    #[serde(rename = "URI")]
    uri: Option<&'a str>,
    #[serde(rename = "RELEASE_ID")]
    release_id: &'a str,
}

pub struct CsvSink<W: Write + Send = File> {
    writer: csv::Writer<W>,
    release_id: String,
}

impl CsvSink {
    /// Opens `path`, appending to it when `append` is set and truncating
    /// otherwise
    ///
    /// The header row is only written when the file starts out empty.
    pub fn create(path: &Path, append: bool, release_id: &str) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let continuing = append && std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;

        Ok(Self::build(file, !continuing, release_id))
    }
}

impl<W: Write + Send> CsvSink<W> {
    pub fn from_writer(writer: W, release_id: &str) -> Self {
        Self::build(writer, true, release_id)
    }

    fn build(writer: W, headers: bool, release_id: &str) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(headers)
                .from_writer(writer),
            release_id: release_id.to_string(),
        }
    }

    pub fn into_inner(self) -> OutputResult<W> {
        self.writer
            .into_inner()
            .map_err(|e| OutputError::Write(e.to_string()))
    }
}

fn row_for<'a>(record: &'a ClassifiedRecord, release_id: &'a str) -> CsvRow<'a> {
    let row = CsvRow {
        kind: record.classification().to_db_string(),
        id: record.id(),
        code: record.code(),
        title: record.description(),
        release_id,
        ..CsvRow::default()
    };

    match record {
        ClassifiedRecord::Chapter(r) => CsvRow {
            release_id: &r.version,
            ..row
        },
        ClassifiedRecord::Section(r) => CsvRow {
            chapter_id: r.chapter_id,
            ..row
        },
        ClassifiedRecord::Subsection(r) => CsvRow {
            chapter_id: r.chapter_id,
            section_id: r.section_id,
            ..row
        },
        ClassifiedRecord::Diagnosis(r) => CsvRow {
            definition: &r.definition,
            chapter_id: r.chapter_id,
            section_id: r.section_id,
            subsection_id: r.subsection_id,
            parent_diagnosis_id: r.parent_diagnosis_id,
            has_subclassification: Some(r.has_subclassification),
            is_infectious: Some(r.is_infectious),
            synonyms: r.synonyms.join("; "),
            inclusions: r.inclusions.join("; "),
            exclusions: r.exclusions.join("; "),
            coding_notes: &r.coding_notes,
            uri: r.uri.as_deref(),
            ..row
        },
    }
}

impl<W: Write + Send> RecordSink for CsvSink<W> {
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()> {
        self.writer.serialize(row_for(record, &self.release_id))?;
        Ok(())
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()> {
        self.writer.serialize(CsvRow {
            kind: "update",
            id: diagnosis_id,
            has_subclassification: Some(true),
            ..CsvRow::default()
        })?;
        Ok(())
    }

    fn end(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn checkpoint(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
