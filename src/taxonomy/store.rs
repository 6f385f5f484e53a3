//! Table of already-fetched entities
//!
//! Entities are keyed by [`Entity::key`] and additionally indexed by every
//! URL they are known under (body `@id` and fetched URL), both normalized.

use crate::model::Entity;
use crate::url::normalize_entity_url;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<String, Entity>,
    by_url: HashMap<String, String>,
    force_https: bool,
}

impl EntityStore {
    pub fn new(force_https: bool) -> Self {
        Self {
            force_https,
            ..Default::default()
        }
    }

    /// Registers an entity the first time its key or one of its URLs is seen
    ///
    /// Returns true for the first registration only. A new block entity
    /// without `depthInKind` gets it derived here, and the derived value is
    /// written back into `entity` so the caller classifies the same document
    /// the store holds. URLs of a rejected duplicate are still indexed as
    /// aliases of the stored entity.
    pub fn record_if_new(&mut self, entity: &mut Entity) -> bool {
        let key = entity.key();

        let existing = if self.entities.contains_key(&key) {
            Some(key.clone())
        } else {
            entity
                .identity_urls()
                .find_map(|url| self.by_url.get(&self.normalize(url)).cloned())
        };

        if let Some(existing) = existing {
            let aliases: Vec<String> = entity.identity_urls().map(|u| self.normalize(u)).collect();
            for alias in aliases {
                self.by_url.entry(alias).or_insert_with(|| existing.clone());
            }
            tracing::trace!("Entity {} already recorded", existing);
            return false;
        }

        if entity.class_kind() == Some("block") && entity.depth_in_kind.is_none() {
            entity.depth_in_kind = Some(self.derive_block_depth(entity));
        }

        let urls: Vec<String> = entity.identity_urls().map(|u| self.normalize(u)).collect();
        for url in urls {
            self.by_url.insert(url, key.clone());
        }
        self.entities.insert(key, entity.clone());
        true
    }

    /// Looks up an entity by any URL it is known under
    pub fn lookup_by_url(&self, url: &str) -> Option<&Entity> {
        self.by_url
            .get(&self.normalize(url))
            .and_then(|key| self.entities.get(key))
    }

    /// Entities without a code are keyed by URL and never match here
    pub fn lookup_by_code(&self, code: &str) -> Option<&Entity> {
        let code = code.trim();
        self.entities.get(code).filter(|e| e.code() == Some(code))
    }

    /// Reloads entities persisted by an earlier run
    ///
    /// Returns how many were added.
    pub fn hydrate(&mut self, entities: impl IntoIterator<Item = Entity>) -> usize {
        let mut added = 0;
        for mut entity in entities {
            if self.record_if_new(&mut entity) {
                added += 1;
            }
        }
        added
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn derive_block_depth(&self, entity: &Entity) -> u32 {
        entity
            .primary_parent()
            .and_then(|parent| self.lookup_by_url(parent))
            .filter(|parent| parent.class_kind() == Some("block"))
            .and_then(|parent| parent.depth_in_kind)
            .map_or(1, |depth| depth + 1)
    }

    fn normalize(&self, url: &str) -> String {
        normalize_entity_url(url, self.force_https).unwrap_or_else(|_| url.to_string())
    }
}
