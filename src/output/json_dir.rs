//! Batching JSON sink
//!
//! Buffers every record and writes `chapters.json`, `sections.json`,
//! `subsections.json` and `diagnoses.json` into one directory when the run
//! ends. Subclassification flips are applied to the buffered diagnosis.
//! A run that stops early writes the same files from its checkpoint, and
//! reopening with `append` reloads them.

use crate::model::{
    ChapterRecord, ClassifiedRecord, DiagnosisRecord, SectionRecord, SubsectionRecord,
};
use crate::output::traits::{OutputResult, RecordSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CHAPTERS_FILE: &str = "chapters.json";
pub const SECTIONS_FILE: &str = "sections.json";
pub const SUBSECTIONS_FILE: &str = "subsections.json";
pub const DIAGNOSES_FILE: &str = "diagnoses.json";

pub struct JsonDirectorySink {
    dir: PathBuf,
    chapters: Vec<ChapterRecord>,
    sections: Vec<SectionRecord>,
    subsections: Vec<SubsectionRecord>,
    diagnoses: Vec<DiagnosisRecord>,
    diagnosis_index: HashMap<u32, usize>,
}

impl JsonDirectorySink {
    /// Prepares `dir`; with `append`, records already written there are
    /// loaded and kept
    pub fn open(dir: &Path, append: bool) -> OutputResult<Self> {
        std::fs::create_dir_all(dir)?;

        let mut sink = Self {
            dir: dir.to_path_buf(),
            chapters: Vec::new(),
            sections: Vec::new(),
            subsections: Vec::new(),
            diagnoses: Vec::new(),
            diagnosis_index: HashMap::new(),
        };

        if append {
            sink.chapters = read_existing(&dir.join(CHAPTERS_FILE))?;
            sink.sections = read_existing(&dir.join(SECTIONS_FILE))?;
            sink.subsections = read_existing(&dir.join(SUBSECTIONS_FILE))?;
            sink.diagnoses = read_existing(&dir.join(DIAGNOSES_FILE))?;
            sink.diagnosis_index = sink
                .diagnoses
                .iter()
                .enumerate()
                .map(|(i, d)| (d.id, i))
                .collect();
            tracing::debug!(
                "Loaded {} existing records from {}",
                sink.chapters.len() + sink.sections.len() + sink.subsections.len() + sink.diagnoses.len(),
                dir.display()
            );
        }

        Ok(sink)
    }

    fn write_all(&self) -> OutputResult<()> {
        self.write_file(CHAPTERS_FILE, &self.chapters)?;
        self.write_file(SECTIONS_FILE, &self.sections)?;
        self.write_file(SUBSECTIONS_FILE, &self.subsections)?;
        self.write_file(DIAGNOSES_FILE, &self.diagnoses)
    }

    fn write_file<T: Serialize>(&self, name: &str, records: &[T]) -> OutputResult<()> {
        let mut writer = BufWriter::new(File::create(self.dir.join(name))?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

fn read_existing<T: DeserializeOwned>(path: &Path) -> OutputResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

impl RecordSink for JsonDirectorySink {
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()> {
        match record {
            ClassifiedRecord::Chapter(r) => self.chapters.push(r.clone()),
            ClassifiedRecord::Section(r) => self.sections.push(r.clone()),
            ClassifiedRecord::Subsection(r) => self.subsections.push(r.clone()),
            ClassifiedRecord::Diagnosis(r) => {
                self.diagnosis_index.insert(r.id, self.diagnoses.len());
                self.diagnoses.push(r.clone());
            }
        }
        Ok(())
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()> {
        match self.diagnosis_index.get(&diagnosis_id) {
            Some(&index) => self.diagnoses[index].has_subclassification = true,
            None => tracing::warn!("Subclassification update for unknown diagnosis {}", diagnosis_id),
        }
        Ok(())
    }

    fn end(&mut self) -> OutputResult<()> {
        self.write_all()?;

        tracing::info!(
            "Wrote {} chapters, {} sections, {} subsections, {} diagnoses to {}",
            self.chapters.len(),
            self.sections.len(),
            self.subsections.len(),
            self.diagnoses.len(),
            self.dir.display()
        );
        Ok(())
    }

    fn checkpoint(&mut self) -> OutputResult<()> {
        self.write_all()?;
        tracing::debug!(
            "Checkpointed {} diagnoses to {}",
            self.diagnoses.len(),
            self.dir.display()
        );
        Ok(())
    }
}
