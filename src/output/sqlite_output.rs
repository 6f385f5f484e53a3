//! SQLite record sink
//!
//! This module writes classified records into one table per taxonomy level.
//! The subclassification flip is an `UPDATE` on the diagnoses table.

use crate::model::{ClassifiedRecord, DiagnosisRecord};
use crate::output::traits::{OutputResult, RecordSink};
use rusqlite::{params, Connection};
use std::path::Path;

const RECORDS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    version TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sections (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    chapter_id INTEGER
);

CREATE TABLE IF NOT EXISTS subsections (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    chapter_id INTEGER,
    section_id INTEGER
);

CREATE TABLE IF NOT EXISTS diagnoses (
    id INTEGER PRIMARY KEY,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    chapter_id INTEGER,
    section_id INTEGER,
    subsection_id INTEGER,
    parent_diagnosis_id INTEGER,
    has_subclassification INTEGER NOT NULL DEFAULT 0,
    is_infectious INTEGER NOT NULL DEFAULT 0,
    definition TEXT NOT NULL DEFAULT '',
    synonyms TEXT NOT NULL DEFAULT '[]',
    inclusions TEXT NOT NULL DEFAULT '[]',
    exclusions TEXT NOT NULL DEFAULT '[]',
    coding_notes TEXT NOT NULL DEFAULT '',
    uri TEXT
);

CREATE INDEX IF NOT EXISTS idx_diagnoses_code ON diagnoses(code);
CREATE INDEX IF NOT EXISTS idx_diagnoses_chapter ON diagnoses(chapter_id);
"#;

/// Document-store sink backed by a SQLite file
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Opens the output database; rows from earlier runs are removed unless `append`
    pub fn open(path: &Path, append: bool) -> OutputResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        Self::init(conn, append)
    }

    pub fn new_in_memory() -> OutputResult<Self> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, append: bool) -> OutputResult<Self> {
        conn.execute_batch(RECORDS_SCHEMA_SQL)?;
        if !append {
            conn.execute_batch(
                "
                DELETE FROM chapters;
                DELETE FROM sections;
                DELETE FROM subsections;
                DELETE FROM diagnoses;
            ",
            )?;
        }
        Ok(Self { conn })
    }

    /// Number of rows in one of the record tables
    pub fn count(&self, table: &str) -> OutputResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Reads back one diagnosis
    pub fn diagnosis(&self, id: u32) -> OutputResult<Option<DiagnosisRecord>> {
        use rusqlite::OptionalExtension;

        let row = self
            .conn
            .query_row(
                "SELECT id, code, description, chapter_id, section_id, subsection_id,
                        parent_diagnosis_id, has_subclassification, is_infectious, definition,
                        synonyms, inclusions, exclusions, coding_notes, uri
                 FROM diagnoses WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        DiagnosisRecord {
                            id: row.get(0)?,
                            code: row.get(1)?,
                            description: row.get(2)?,
                            chapter_id: row.get(3)?,
                            section_id: row.get(4)?,
                            subsection_id: row.get(5)?,
                            parent_diagnosis_id: row.get(6)?,
                            has_subclassification: row.get(7)?,
                            is_infectious: row.get(8)?,
                            definition: row.get(9)?,
                            synonyms: Vec::new(),
                            inclusions: Vec::new(),
                            exclusions: Vec::new(),
                            coding_notes: row.get(13)?,
                            uri: row.get(14)?,
                        },
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                        row.get::<_, String>(12)?,
                    ))
                },
            )
            .optional()?;

        let Some((mut record, synonyms, inclusions, exclusions)) = row else {
            return Ok(None);
        };
        record.synonyms = serde_json::from_str(&synonyms)?;
        record.inclusions = serde_json::from_str(&inclusions)?;
        record.exclusions = serde_json::from_str(&exclusions)?;
        Ok(Some(record))
    }
}

impl RecordSink for SqliteSink {
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()> {
        match record {
            ClassifiedRecord::Chapter(r) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO chapters (id, code, description, version)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![r.id, r.code, r.description, r.version],
                )?;
            }
            ClassifiedRecord::Section(r) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO sections (id, code, description, chapter_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![r.id, r.code, r.description, r.chapter_id],
                )?;
            }
            ClassifiedRecord::Subsection(r) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO subsections (id, code, description, chapter_id, section_id)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![r.id, r.code, r.description, r.chapter_id, r.section_id],
                )?;
            }
            ClassifiedRecord::Diagnosis(r) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO diagnoses (
                        id, code, description, chapter_id, section_id, subsection_id,
                        parent_diagnosis_id, has_subclassification, is_infectious, definition,
                        synonyms, inclusions, exclusions, coding_notes, uri
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        r.id,
                        r.code,
                        r.description,
                        r.chapter_id,
                        r.section_id,
                        r.subsection_id,
                        r.parent_diagnosis_id,
                        r.has_subclassification,
                        r.is_infectious,
                        r.definition,
                        serde_json::to_string(&r.synonyms)?,
                        serde_json::to_string(&r.inclusions)?,
                        serde_json::to_string(&r.exclusions)?,
                        r.coding_notes,
                        r.uri,
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()> {
        let changed = self.conn.execute(
            "UPDATE diagnoses SET has_subclassification = 1 WHERE id = ?1",
            params![diagnosis_id],
        )?;
        if changed == 0 {
            tracing::warn!("Subclassification update for unknown diagnosis {}", diagnosis_id);
        }
        Ok(())
    }

    fn end(&mut self) -> OutputResult<()> {
        tracing::info!(
            "Output database holds {} chapters, {} sections, {} subsections, {} diagnoses",
            self.count("chapters")?,
            self.count("sections")?,
            self.count("subsections")?,
            self.count("diagnoses")?
        );
        Ok(())
    }
}
