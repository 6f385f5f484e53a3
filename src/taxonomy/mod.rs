//! Taxonomy engine
//!
//! Turns fetched entities into linked records:
//! - [`EntityStore`] deduplicates entities and indexes them by code and URL
//! - [`classify`] assigns each entity exactly one taxonomy level
//! - [`resolve_ancestors`] climbs parent references to the nearest chapter,
//!   section, subsection and diagnosis
//! - [`IdAssigner`] issues per-class ids and links records to their parents

mod classifier;
mod hierarchy;
mod ids;
mod store;

pub use classifier::classify;
pub use hierarchy::{resolve_ancestors, Ancestors};
pub use ids::{AssignedId, Assignment, IdAssigner};
pub use store::EntityStore;
