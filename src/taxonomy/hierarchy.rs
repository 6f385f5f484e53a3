//! Ancestor resolution over the entity store

use crate::model::{Classification, Entity};
use crate::taxonomy::{classify, EntityStore};
use std::collections::HashSet;

/// Nearest ancestor at each coarser taxonomy level
///
/// A level is `None` when no such ancestor exists or when the climb
/// stopped before reaching it (unfetched parent or cycle).
#[derive(Debug, Default, Clone, Copy)]
pub struct Ancestors<'a> {
    pub chapter: Option<&'a Entity>,
    pub section: Option<&'a Entity>,
    pub subsection: Option<&'a Entity>,
    pub diagnosis: Option<&'a Entity>,
    /// The climb revisited an entity
    pub cycle_detected: bool,
    /// First parent URL on the chain that is not in the store yet
    pub unresolved_parent: Option<&'a str>,
}

/// Climbs `entity`'s primary parents until a chapter is reached
///
/// Only the first `parent` reference is followed. Each level keeps the
/// nearest match. The release root ends the climb without being counted
/// as an ancestor. Revisiting an entity logs a warning and returns what
/// was found so far.
pub fn resolve_ancestors<'a>(entity: &'a Entity, store: &'a EntityStore) -> Ancestors<'a> {
    let mut ancestors = Ancestors::default();
    let mut visited = HashSet::new();
    visited.insert(entity.key());

    let mut current = entity;
    while let Some(parent_url) = current.primary_parent() {
        let Some(parent) = store.lookup_by_url(parent_url) else {
            tracing::debug!(
                "Parent {} of {} not fetched yet",
                parent_url,
                current.key()
            );
            ancestors.unresolved_parent = Some(parent_url);
            break;
        };

        if parent.is_release_root() {
            break;
        }

        if !visited.insert(parent.key()) {
            tracing::warn!(
                "Cycle in parent chain of {} at {}",
                entity.key(),
                parent.key()
            );
            ancestors.cycle_detected = true;
            break;
        }

        match classify(parent) {
            Classification::Chapter => {
                ancestors.chapter = Some(parent);
                break;
            }
            Classification::Section => {
                ancestors.section.get_or_insert(parent);
            }
            Classification::Subsection => {
                ancestors.subsection.get_or_insert(parent);
            }
            Classification::Diagnosis => {
                ancestors.diagnosis.get_or_insert(parent);
            }
        }

        current = parent;
    }

    ancestors
}
