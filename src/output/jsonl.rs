//! Streaming JSON Lines sink
//!
//! Every record is one line tagged with its `kind`. A subclassification
//! flip is appended as its own line:
//!
//! ```text
//! {"kind":"update","diagnosis_id":7,"has_subclassification":true}
//! ```

use crate::model::ClassifiedRecord;
use crate::output::traits::{OutputResult, RecordSink};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct UpdateLine {
    kind: &'static str,
    diagnosis_id: u32,
    has_subclassification: bool,
}

pub struct JsonLinesSink<W: Write + Send = BufWriter<File>> {
    writer: W,
}

impl JsonLinesSink {
    /// Opens `path`, appending to it when `append` is set and truncating otherwise
    pub fn create(path: &Path, append: bool) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;

        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl<W: Write + Send> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()> {
        self.write_line(record)
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()> {
        self.write_line(&UpdateLine {
            kind: "update",
            diagnosis_id,
            has_subclassification: true,
        })
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
