//! URL handling module for ICD Harvester
//!
//! Entity URLs are normalized before they enter the frontier or the entity
//! store indexes, so that references differing only in scheme, host case,
//! trailing slash or fragment resolve to the same entity.

mod normalize;

pub use normalize::{normalize_entity_url, resolve_entity_url};
