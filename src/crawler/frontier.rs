//! Crawl work queue
//!
//! A frontier deduplicates URLs and tracks each one through
//! pending → in_progress → completed. Requests that do not fit the
//! current status of a URL are no-ops.

use crate::state::{FrontierCounts, FrontierStatus};
use crate::storage::{SqliteStorage, Storage, StorageResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Outcome of asking the frontier for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The URL is now in_progress and owned by the caller
    Claimed(String),
    /// Nothing is pending, but claimed URLs may still add work
    Idle,
    /// Nothing is pending or in progress: the crawl is complete
    Exhausted,
}

pub trait Frontier: Send {
    /// Adds a URL as pending; returns false if it was already known
    fn enqueue(&mut self, url: &str) -> StorageResult<bool>;

    fn claim_next(&mut self) -> StorageResult<Claim>;

    /// Marks an in_progress URL as completed
    fn complete(&mut self, url: &str) -> StorageResult<()>;

    /// Returns an in_progress URL to pending after a failed attempt
    fn requeue(&mut self, url: &str) -> StorageResult<()>;

    /// Restart recovery: every in_progress URL goes back to pending
    fn reset_in_progress(&mut self) -> StorageResult<usize>;

    fn counts(&self) -> StorageResult<FrontierCounts>;
}

/// Non-resumable frontier held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryFrontier {
    queue: VecDeque<String>,
    status: HashMap<String, FrontierStatus>,
    counts: FrontierCounts,
}

impl MemoryFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(&mut self, url: &str, to: FrontierStatus) -> bool {
        let Some(current) = self.status.get_mut(url) else {
            tracing::debug!("Ignoring {} for unknown URL {}", to, url);
            return false;
        };

        if !current.can_transition_to(to) {
            tracing::debug!("Ignoring {} -> {} for {}", current, to, url);
            return false;
        }

        let from = std::mem::replace(current, to);
        *slot(&mut self.counts, from) -= 1;
        *slot(&mut self.counts, to) += 1;
        true
    }
}

fn slot(counts: &mut FrontierCounts, status: FrontierStatus) -> &mut usize {
    match status {
        FrontierStatus::Pending => &mut counts.pending,
        FrontierStatus::InProgress => &mut counts.in_progress,
        FrontierStatus::Completed => &mut counts.completed,
    }
}

impl Frontier for MemoryFrontier {
    fn enqueue(&mut self, url: &str) -> StorageResult<bool> {
        if self.status.contains_key(url) {
            return Ok(false);
        }
        self.status.insert(url.to_string(), FrontierStatus::Pending);
        self.queue.push_back(url.to_string());
        self.counts.pending += 1;
        Ok(true)
    }

    fn claim_next(&mut self) -> StorageResult<Claim> {
        while let Some(url) = self.queue.pop_front() {
            if self.transition(&url, FrontierStatus::InProgress) {
                return Ok(Claim::Claimed(url));
            }
        }

        if self.counts.in_progress > 0 {
            Ok(Claim::Idle)
        } else {
            Ok(Claim::Exhausted)
        }
    }

    fn complete(&mut self, url: &str) -> StorageResult<()> {
        self.transition(url, FrontierStatus::Completed);
        Ok(())
    }

    fn requeue(&mut self, url: &str) -> StorageResult<()> {
        if self.transition(url, FrontierStatus::Pending) {
            self.queue.push_back(url.to_string());
        }
        Ok(())
    }

    fn reset_in_progress(&mut self) -> StorageResult<usize> {
        let claimed: Vec<String> = self
            .status
            .iter()
            .filter(|(_, status)| **status == FrontierStatus::InProgress)
            .map(|(url, _)| url.clone())
            .collect();

        for url in &claimed {
            self.requeue(url)?;
        }
        Ok(claimed.len())
    }

    fn counts(&self) -> StorageResult<FrontierCounts> {
        Ok(self.counts)
    }
}

/// Resumable frontier backed by the run-state database
pub struct SqliteFrontier {
    storage: Arc<Mutex<SqliteStorage>>,
}

impl SqliteFrontier {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self { storage }
    }

    fn with_storage<T>(&self, f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>) -> StorageResult<T> {
        let mut storage = self.storage.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut storage)
    }
}

impl Frontier for SqliteFrontier {
    fn enqueue(&mut self, url: &str) -> StorageResult<bool> {
        self.with_storage(|s| s.frontier_insert(url))
    }

    fn claim_next(&mut self) -> StorageResult<Claim> {
        self.with_storage(|s| match s.frontier_claim()? {
            Some(url) => Ok(Claim::Claimed(url)),
            None if s.frontier_counts()?.in_progress > 0 => Ok(Claim::Idle),
            None => Ok(Claim::Exhausted),
        })
    }

    fn complete(&mut self, url: &str) -> StorageResult<()> {
        self.with_storage(|s| {
            if !s.frontier_transition(url, FrontierStatus::InProgress, FrontierStatus::Completed)? {
                tracing::debug!("Ignoring completion of {} (not in progress)", url);
            }
            Ok(())
        })
    }

    fn requeue(&mut self, url: &str) -> StorageResult<()> {
        self.with_storage(|s| {
            if !s.frontier_transition(url, FrontierStatus::InProgress, FrontierStatus::Pending)? {
                tracing::debug!("Ignoring requeue of {} (not in progress)", url);
            }
            Ok(())
        })
    }

    fn reset_in_progress(&mut self) -> StorageResult<usize> {
        self.with_storage(|s| s.frontier_reset_in_progress())
    }

    fn counts(&self) -> StorageResult<FrontierCounts> {
        self.with_storage(|s| s.frontier_counts())
    }
}
