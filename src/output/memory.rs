//! In-memory sink for tests and embedding

use crate::model::ClassifiedRecord;
use crate::output::traits::{OutputResult, RecordSink};
use std::sync::{Arc, Mutex, PoisonError};

/// Everything a [`MemorySink`] has received
#[derive(Debug, Clone, Default)]
pub struct CollectedRecords {
    pub records: Vec<ClassifiedRecord>,
    pub updates: Vec<u32>,
    pub end_calls: usize,
    pub checkpoint_calls: usize,
}

impl CollectedRecords {
    pub fn diagnoses(&self) -> impl Iterator<Item = &crate::model::DiagnosisRecord> {
        self.records.iter().filter_map(|r| match r {
            ClassifiedRecord::Diagnosis(d) => Some(d),
            _ => None,
        })
    }
}

/// Collects records into shared memory
///
/// The sink itself moves into the sink task; keep the handle returned by
/// [`MemorySink::new`] to inspect what was collected.
pub struct MemorySink {
    collected: Arc<Mutex<CollectedRecords>>,
}

impl MemorySink {
    pub fn new() -> (Self, Arc<Mutex<CollectedRecords>>) {
        let collected = Arc::new(Mutex::new(CollectedRecords::default()));
        (
            Self {
                collected: Arc::clone(&collected),
            },
            collected,
        )
    }

    fn with<T>(&self, f: impl FnOnce(&mut CollectedRecords) -> T) -> T {
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut collected)
    }
}

impl RecordSink for MemorySink {
    fn emit(&mut self, record: &ClassifiedRecord) -> OutputResult<()> {
        self.with(|c| c.records.push(record.clone()));
        Ok(())
    }

    fn mark_subclassified(&mut self, diagnosis_id: u32) -> OutputResult<()> {
        self.with(|c| {
            c.updates.push(diagnosis_id);
            for record in c.records.iter_mut() {
                if let ClassifiedRecord::Diagnosis(d) = record {
                    if d.id == diagnosis_id {
                        d.has_subclassification = true;
                    }
                }
            }
        });
        Ok(())
    }

    fn end(&mut self) -> OutputResult<()> {
        self.with(|c| c.end_calls += 1);
        Ok(())
    }

    fn checkpoint(&mut self) -> OutputResult<()> {
        self.with(|c| c.checkpoint_calls += 1);
        Ok(())
    }
}
