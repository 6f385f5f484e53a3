//! Run report and validation findings
//!
//! Findings never stop a run. They are collected while records are built
//! and surfaced once the run is over.

use crate::model::Classification;
use crate::state::FrontierCounts;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// A URL abandoned after its retries and requeues ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
}

/// A record emitted without one of its expected ancestor links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingLink {
    pub class: Classification,
    pub id: u32,
    pub code: String,
}

/// A record whose ancestor climb hit a parent that was not fetched yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedParent {
    pub entity_key: String,
    pub parent_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub failed_urls: Vec<FailedUrl>,
    /// Non-chapter records without a resolved chapter
    pub missing_chapter: Vec<MissingLink>,
    /// Entity keys whose parent chain loops
    pub cycles: Vec<String>,
    pub unresolved_parents: Vec<UnresolvedParent>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    pub fn issue_count(&self) -> usize {
        self.failed_urls.len()
            + self.missing_chapter.len()
            + self.cycles.len()
            + self.unresolved_parents.len()
    }

    /// Diagnoses among the records missing a chapter
    pub fn diagnoses_without_chapter(&self) -> impl Iterator<Item = &MissingLink> {
        self.missing_chapter
            .iter()
            .filter(|m| m.class == Classification::Diagnosis)
    }

    /// Writes a short summary to the log
    pub fn log_summary(&self) {
        if self.is_clean() {
            tracing::info!("Validation: no issues");
            return;
        }

        tracing::warn!(
            "Validation: {} failed URLs, {} records without chapter ({} diagnoses), {} cycles, {} unresolved parents",
            self.failed_urls.len(),
            self.missing_chapter.len(),
            self.diagnoses_without_chapter().count(),
            self.cycles.len(),
            self.unresolved_parents.len()
        );

        for failed in &self.failed_urls {
            tracing::warn!("Abandoned {}: {}", failed.url, failed.error);
        }
    }
}

/// Outcome of one harvest run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub run_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub urls_completed: u64,
    pub entities_recorded: u64,
    /// Fetches that resolved to an entity already recorded under another URL
    pub aliases: u64,
    pub records: HashMap<Classification, u64>,
    pub subclassified: u64,
    pub frontier: FrontierCounts,
    pub validation: ValidationReport,
}

impl CrawlReport {
    pub fn new(run_id: Option<i64>) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            urls_completed: 0,
            entities_recorded: 0,
            aliases: 0,
            records: Classification::all().into_iter().map(|c| (c, 0)).collect(),
            subclassified: 0,
            frontier: FrontierCounts::default(),
            validation: ValidationReport::default(),
        }
    }

    pub fn records_of(&self, class: Classification) -> u64 {
        self.records.get(&class).copied().unwrap_or(0)
    }

    pub fn total_records(&self) -> u64 {
        self.records.values().sum()
    }

    pub fn urls_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.urls_completed as f64 / secs
        } else {
            0.0
        }
    }
}
