//! Per-class id assignment and record linking

use crate::model::{
    ChapterRecord, Classification, ClassifiedRecord, DiagnosisRecord, Entity, SectionRecord,
    SubsectionRecord,
};
use crate::taxonomy::Ancestors;
use std::collections::{HashMap, HashSet};

/// One persisted id assignment, used to continue a run after restart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedId {
    pub entity_key: String,
    pub class: Classification,
    pub id: u32,
    pub code: String,
    pub has_subclassification: bool,
}

/// Result of assigning an id to one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub record: ClassifiedRecord,
    /// Diagnosis whose `has_subclassification` flips to true because of
    /// this record; reported once per parent
    pub subclassified_parent: Option<u32>,
}

/// Issues 1-based ids per class and resolves parent links
///
/// One instance lives for one crawl run. Links only ever point at ids that
/// were issued before the record being built.
#[derive(Debug)]
pub struct IdAssigner {
    counters: HashMap<Classification, u32>,
    by_key: HashMap<String, (Classification, u32)>,
    diagnosis_by_code: HashMap<String, u32>,
    subclassified: HashSet<u32>,
    version: String,
    infectious_keywords: Vec<String>,
}

impl IdAssigner {
    pub fn new(version: impl Into<String>, infectious_keywords: &[String]) -> Self {
        Self {
            counters: HashMap::new(),
            by_key: HashMap::new(),
            diagnosis_by_code: HashMap::new(),
            subclassified: HashSet::new(),
            version: version.into(),
            infectious_keywords: infectious_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Builds the linked record for a newly recorded entity
    pub fn assign(
        &mut self,
        class: Classification,
        entity: &Entity,
        ancestors: &Ancestors<'_>,
    ) -> Assignment {
        let id = self.next_id(class);
        let code = entity.display_code();
        let description = entity.title_text().to_string();

        let chapter_id = self.linked_id(ancestors.chapter, Classification::Chapter);
        let section_id = self.linked_id(ancestors.section, Classification::Section);
        let subsection_id = self.linked_id(ancestors.subsection, Classification::Subsection);

        let mut subclassified_parent = None;

        let record = match class {
            Classification::Chapter => ClassifiedRecord::Chapter(ChapterRecord {
                id,
                code,
                description,
                version: self.version.clone(),
            }),
            Classification::Section => ClassifiedRecord::Section(SectionRecord {
                id,
                code,
                description,
                chapter_id,
            }),
            Classification::Subsection => ClassifiedRecord::Subsection(SubsectionRecord {
                id,
                code,
                description,
                chapter_id,
                section_id,
            }),
            Classification::Diagnosis => {
                let parent_diagnosis_id = self.parent_diagnosis_id(entity, ancestors);
                if let Some(parent_id) = parent_diagnosis_id {
                    if self.subclassified.insert(parent_id) {
                        subclassified_parent = Some(parent_id);
                    }
                }

                if let Some(own_code) = entity.code() {
                    self.diagnosis_by_code.entry(own_code.to_string()).or_insert(id);
                }

                ClassifiedRecord::Diagnosis(DiagnosisRecord {
                    id,
                    code,
                    is_infectious: self.is_infectious(&description),
                    description,
                    chapter_id,
                    section_id,
                    subsection_id,
                    parent_diagnosis_id,
                    has_subclassification: false,
                    definition: entity.definition_text().to_string(),
                    synonyms: entity.synonyms(),
                    inclusions: entity.inclusions(),
                    exclusions: entity.exclusions(),
                    coding_notes: entity.coding_note_text().to_string(),
                    uri: entity.uri.clone(),
                })
            }
        };

        self.by_key.insert(entity.key(), (class, id));

        Assignment {
            record,
            subclassified_parent,
        }
    }

    /// True when the lower-cased title contains any infectious keyword
    pub fn is_infectious(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.infectious_keywords.iter().any(|k| title.contains(k.as_str()))
    }

    /// Number of ids issued so far for `class`
    pub fn issued(&self, class: Classification) -> u32 {
        self.counters.get(&class).copied().unwrap_or(0)
    }

    /// Id already assigned to an entity key
    pub fn assigned(&self, key: &str) -> Option<(Classification, u32)> {
        self.by_key.get(key).copied()
    }

    /// Exports every assignment, in no particular order
    pub fn snapshot(&self) -> Vec<AssignedId> {
        let codes: HashMap<u32, &str> = self
            .diagnosis_by_code
            .iter()
            .map(|(code, id)| (*id, code.as_str()))
            .collect();

        self.by_key
            .iter()
            .map(|(key, &(class, id))| AssignedId {
                entity_key: key.clone(),
                class,
                id,
                code: match class {
                    Classification::Diagnosis => codes.get(&id).copied().unwrap_or_default().to_string(),
                    _ => String::new(),
                },
                has_subclassification: class == Classification::Diagnosis
                    && self.subclassified.contains(&id),
            })
            .collect()
    }

    /// Continues from assignments persisted by an earlier run
    ///
    /// Counters resume after the highest restored id of each class.
    pub fn restore(&mut self, assigned: impl IntoIterator<Item = AssignedId>) {
        for row in assigned {
            let counter = self.counters.entry(row.class).or_insert(0);
            *counter = (*counter).max(row.id);

            if row.class == Classification::Diagnosis {
                if !row.code.is_empty() {
                    self.diagnosis_by_code.entry(row.code).or_insert(row.id);
                }
                if row.has_subclassification {
                    self.subclassified.insert(row.id);
                }
            }

            self.by_key.insert(row.entity_key, (row.class, row.id));
        }
    }

    fn next_id(&mut self, class: Classification) -> u32 {
        let counter = self.counters.entry(class).or_insert(0);
        *counter += 1;
        *counter
    }

    fn linked_id(&self, ancestor: Option<&Entity>, class: Classification) -> Option<u32> {
        ancestor
            .and_then(|e| self.by_key.get(&e.key()))
            .filter(|(assigned_class, _)| *assigned_class == class)
            .map(|(_, id)| *id)
    }

    /// Code prefix before the first `.` when it names an assigned
    /// diagnosis, else the nearest diagnosis on the ancestor chain
    fn parent_diagnosis_id(&self, entity: &Entity, ancestors: &Ancestors<'_>) -> Option<u32> {
        let by_prefix = entity
            .code()
            .and_then(|code| code.split_once('.'))
            .map(|(prefix, _)| prefix)
            .filter(|prefix| !prefix.is_empty())
            .and_then(|prefix| self.diagnosis_by_code.get(prefix).copied());

        by_prefix.or_else(|| self.linked_id(ancestors.diagnosis, Classification::Diagnosis))
    }
}
