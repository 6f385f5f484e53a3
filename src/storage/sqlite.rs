//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{Classification, Entity};
use crate::state::{FrontierCounts, FrontierStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::taxonomy::AssignedId;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1 WHERE id = ?2",
            params![status.to_db_string(), run_id],
        )?;
        Ok(())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Frontier =====

    fn frontier_insert(&mut self, url: &str) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO frontier (url, status, seq)
             VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM frontier))",
            params![url, FrontierStatus::Pending.to_db_string()],
        )?;
        Ok(inserted > 0)
    }

    fn frontier_claim(&mut self) -> StorageResult<Option<String>> {
        let tx = self.conn.transaction()?;

        let url: Option<String> = tx
            .query_row(
                "SELECT url FROM frontier WHERE status = ?1 ORDER BY seq LIMIT 1",
                params![FrontierStatus::Pending.to_db_string()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(url) = &url {
            tx.execute(
                "UPDATE frontier SET status = ?1 WHERE url = ?2",
                params![FrontierStatus::InProgress.to_db_string(), url],
            )?;
        }

        tx.commit()?;
        Ok(url)
    }

    fn frontier_status(&self, url: &str) -> StorageResult<Option<FrontierStatus>> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM frontier WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        status
            .map(|s| {
                FrontierStatus::from_db_string(&s).ok_or(StorageError::Corrupt {
                    table: "frontier",
                    message: format!("unknown status '{}'", s),
                })
            })
            .transpose()
    }

    fn frontier_transition(
        &mut self,
        url: &str,
        from: FrontierStatus,
        to: FrontierStatus,
    ) -> StorageResult<bool> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }

        // a requeued URL goes to the back of the queue
        let changed = if to == FrontierStatus::Pending {
            self.conn.execute(
                "UPDATE frontier SET status = ?1, seq = (SELECT MAX(seq) + 1 FROM frontier)
                 WHERE url = ?2 AND status = ?3",
                params![to.to_db_string(), url, from.to_db_string()],
            )?
        } else {
            self.conn.execute(
                "UPDATE frontier SET status = ?1 WHERE url = ?2 AND status = ?3",
                params![to.to_db_string(), url, from.to_db_string()],
            )?
        };

        Ok(changed > 0)
    }

    fn frontier_reset_in_progress(&mut self) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE frontier SET status = ?1 WHERE status = ?2",
            params![
                FrontierStatus::Pending.to_db_string(),
                FrontierStatus::InProgress.to_db_string()
            ],
        )?;
        Ok(changed)
    }

    fn frontier_counts(&self) -> StorageResult<FrontierCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM frontier GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = FrontierCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as usize;
            match FrontierStatus::from_db_string(&status) {
                Some(FrontierStatus::Pending) => counts.pending = count,
                Some(FrontierStatus::InProgress) => counts.in_progress = count,
                Some(FrontierStatus::Completed) => counts.completed = count,
                None => {
                    return Err(StorageError::Corrupt {
                        table: "frontier",
                        message: format!("unknown status '{}'", status),
                    })
                }
            }
        }

        Ok(counts)
    }

    fn clear_state(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM frontier;
            DELETE FROM entities;
            DELETE FROM assignments;
        ",
        )?;
        Ok(())
    }

    // ===== Entities =====

    fn save_entity(&mut self, entity: &Entity) -> StorageResult<()> {
        let json =
            serde_json::to_string(entity).map_err(|e| StorageError::Serialization(e.to_string()))?;

        self.conn.execute(
            "INSERT OR IGNORE INTO entities (key, code, url, json) VALUES (?1, ?2, ?3, ?4)",
            params![entity.key(), entity.code(), entity.source_url, json],
        )?;
        Ok(())
    }

    fn load_entities(&self) -> StorageResult<Vec<Entity>> {
        let mut stmt = self.conn.prepare("SELECT json FROM entities ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut entities = Vec::new();
        for row in rows {
            let json = row?;
            let entity = serde_json::from_str(&json)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            entities.push(entity);
        }

        Ok(entities)
    }

    fn count_entities(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Assignments =====

    fn save_assignment(&mut self, assigned: &AssignedId) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO assignments (entity_key, class, id, code, has_subclassification)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                assigned.entity_key,
                assigned.class.to_db_string(),
                assigned.id,
                assigned.code,
                assigned.has_subclassification,
            ],
        )?;
        Ok(())
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE assignments SET has_subclassification = 1 WHERE class = ?1 AND id = ?2",
            params![Classification::Diagnosis.to_db_string(), diagnosis_id],
        )?;
        Ok(())
    }

    fn load_assignments(&self) -> StorageResult<Vec<AssignedId>> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_key, class, id, code, has_subclassification FROM assignments ORDER BY class, id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?;

        let mut assigned = Vec::new();
        for row in rows {
            let (entity_key, class, id, code, has_subclassification) = row?;
            let class = Classification::from_db_string(&class).ok_or_else(|| StorageError::Corrupt {
                table: "assignments",
                message: format!("unknown class '{}'", class),
            })?;
            assigned.push(AssignedId {
                entity_key,
                class,
                id,
                code,
                has_subclassification,
            });
        }

        Ok(assigned)
    }

    fn count_assignments(&self) -> StorageResult<HashMap<Classification, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT class, COUNT(*) FROM assignments GROUP BY class")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts: HashMap<Classification, u64> =
            Classification::all().into_iter().map(|c| (c, 0)).collect();
        for row in rows {
            let (class, count) = row?;
            if let Some(class) = Classification::from_db_string(&class) {
                counts.insert(class, count as u64);
            }
        }

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(code: &str, url: &str) -> Entity {
        Entity {
            code: Some(code.to_string()),
            source_url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("test_hash").unwrap();
        assert!(run_id > 0);

        let run = storage.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.config_hash, "test_hash");
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn test_finish_run() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first = storage.create_run("a").unwrap();
        storage.finish_run(first, RunStatus::Failed).unwrap();
        let second = storage.create_run("b").unwrap();

        let latest = storage.get_latest_run().unwrap().unwrap();
        assert_eq!(latest.id, second);

        let finished = storage.get_run(first).unwrap();
        assert_eq!(finished.status, RunStatus::Failed);
        assert!(finished.finished_at.is_some());

        assert!(matches!(storage.get_run(999), Err(StorageError::RunNotFound(999))));
    }

    #[test]
    fn test_frontier_insert_is_idempotent() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.frontier_insert("https://x.org/a").unwrap());
        assert!(!storage.frontier_insert("https://x.org/a").unwrap());

        let counts = storage.frontier_counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_frontier_claim_order_and_transitions() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.frontier_insert("https://x.org/a").unwrap();
        storage.frontier_insert("https://x.org/b").unwrap();

        let a = storage.frontier_claim().unwrap().unwrap();
        assert_eq!(a, "https://x.org/a");
        assert_eq!(
            storage.frontier_status(&a).unwrap(),
            Some(FrontierStatus::InProgress)
        );

        // requeue sends a to the back
        assert!(storage
            .frontier_transition(&a, FrontierStatus::InProgress, FrontierStatus::Pending)
            .unwrap());
        assert_eq!(storage.frontier_claim().unwrap().unwrap(), "https://x.org/b");
        assert_eq!(storage.frontier_claim().unwrap().unwrap(), "https://x.org/a");
        assert_eq!(storage.frontier_claim().unwrap(), None);

        assert!(storage
            .frontier_transition(&a, FrontierStatus::InProgress, FrontierStatus::Completed)
            .unwrap());
        // completed is final
        assert!(!storage
            .frontier_transition(&a, FrontierStatus::InProgress, FrontierStatus::Pending)
            .unwrap());
        assert!(!storage
            .frontier_transition(&a, FrontierStatus::Completed, FrontierStatus::Pending)
            .unwrap());
        assert_eq!(
            storage.frontier_status(&a).unwrap(),
            Some(FrontierStatus::Completed)
        );
    }

    #[test]
    fn test_frontier_reset_in_progress() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for url in ["https://x.org/1", "https://x.org/2", "https://x.org/3"] {
            storage.frontier_insert(url).unwrap();
        }
        storage.frontier_claim().unwrap();
        storage.frontier_claim().unwrap();

        assert_eq!(storage.frontier_reset_in_progress().unwrap(), 2);
        let counts = storage.frontier_counts().unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.in_progress, 0);
    }

    #[test]
    fn test_entity_persistence() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.save_entity(&entity("01", "https://x.org/c")).unwrap();
        storage.save_entity(&entity("1A", "https://x.org/s")).unwrap();
        // same key is ignored
        storage.save_entity(&entity("01", "https://x.org/alias")).unwrap();

        let loaded = storage.load_entities().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].code(), Some("01"));
        assert_eq!(loaded[0].source_url.as_deref(), Some("https://x.org/c"));
        assert_eq!(storage.count_entities().unwrap(), 2);
    }

    #[test]
    fn test_assignment_persistence() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .save_assignment(&AssignedId {
                entity_key: "A01".to_string(),
                class: Classification::Diagnosis,
                id: 1,
                code: "A01".to_string(),
                has_subclassification: false,
            })
            .unwrap();
        storage
            .save_assignment(&AssignedId {
                entity_key: "01".to_string(),
                class: Classification::Chapter,
                id: 1,
                code: String::new(),
                has_subclassification: false,
            })
            .unwrap();
        storage.mark_subclassified(1).unwrap();

        let loaded = storage.load_assignments().unwrap();
        let diagnosis = loaded
            .iter()
            .find(|a| a.class == Classification::Diagnosis)
            .unwrap();
        assert!(diagnosis.has_subclassification);
        let chapter = loaded
            .iter()
            .find(|a| a.class == Classification::Chapter)
            .unwrap();
        assert!(!chapter.has_subclassification);

        let counts = storage.count_assignments().unwrap();
        assert_eq!(counts[&Classification::Diagnosis], 1);
        assert_eq!(counts[&Classification::Section], 0);
    }

    #[test]
    fn test_clear_state_keeps_runs() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("h").unwrap();
        storage.frontier_insert("https://x.org/a").unwrap();
        storage.save_entity(&entity("01", "https://x.org/a")).unwrap();

        storage.clear_state().unwrap();

        assert_eq!(storage.frontier_counts().unwrap().total(), 0);
        assert_eq!(storage.count_entities().unwrap(), 0);
        assert!(storage.get_run(run_id).is_ok());
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");

        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.frontier_insert("https://x.org/a").unwrap();
        }

        let storage = SqliteStorage::new(&path).unwrap();
        assert_eq!(storage.frontier_counts().unwrap().pending, 1);
    }
}
