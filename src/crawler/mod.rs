//! Crawler module for entity fetching and crawl coordination
//!
//! This module contains the core crawling logic, including:
//! - Authenticated HTTP fetching with retry logic
//! - The shared frontier of entity URLs (in memory or resumable)
//! - The worker pool that classifies, links and emits records

mod coordinator;
mod fetcher;
mod frontier;

pub use coordinator::{run_crawl, Coordinator, RunOptions};
pub use fetcher::{build_http_client, FetchError, Fetcher, RetryPolicy};
pub use frontier::{Claim, Frontier, MemoryFrontier, SqliteFrontier};
pub use crate::output::CrawlReport;
