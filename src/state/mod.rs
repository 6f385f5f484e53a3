//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `FrontierStatus`: the pending → in_progress → completed lifecycle of a frontier URL
//! - `FrontierCounts`: per-status tallies used for progress and termination

mod frontier_status;

pub use frontier_status::{FrontierCounts, FrontierStatus};
