//! Statistics from the run-state database
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the storage layer.

use crate::model::Classification;
use crate::state::FrontierCounts;
use crate::storage::{RunRecord, Storage, StorageResult};
use std::collections::HashMap;

/// Harvest statistics summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,

    pub frontier: FrontierCounts,

    /// Number of distinct entities fetched
    pub entities: u64,

    /// Ids issued per class
    pub records: HashMap<Classification, u64>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        latest_run: storage.get_latest_run()?,
        frontier: storage.frontier_counts()?,
        entities: storage.count_entities()?,
        records: storage.count_assignments()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    match &stats.latest_run {
        Some(run) => {
            println!("Latest run:");
            println!("  Id: {}", run.id);
            println!("  Status: {}", run.status.to_db_string());
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
        }
        None => println!("No runs recorded yet"),
    }
    println!();

    let total = stats.frontier.total();
    println!("Frontier ({} URLs):", total);
    for (label, count) in [
        ("pending", stats.frontier.pending),
        ("in_progress", stats.frontier.in_progress),
        ("completed", stats.frontier.completed),
    ] {
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    println!("Entities fetched: {}", stats.entities);
    println!("Records:");
    for class in Classification::all() {
        println!(
            "  {}: {}",
            class,
            stats.records.get(&class).copied().unwrap_or(0)
        );
    }
}
