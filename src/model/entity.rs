//! Raw entity documents as served by the linearization API

use serde::{Deserialize, Serialize};

/// A language-tagged string (`{"@language": "en", "@value": "..."}`)
///
/// Plain JSON strings are accepted as well and read as untagged values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawText")]
pub struct LocalizedText {
    #[serde(rename = "@language", skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(rename = "@value")]
    pub value: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawText {
    Plain(String),
    Tagged {
        #[serde(rename = "@language", default)]
        language: Option<String>,
        #[serde(rename = "@value", default)]
        value: String,
    },
}

impl From<RawText> for LocalizedText {
    fn from(raw: RawText) -> Self {
        match raw {
            RawText::Plain(value) => Self {
                language: None,
                value,
            },
            RawText::Tagged { language, value } => Self { language, value },
        }
    }
}

impl LocalizedText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            language: None,
            value: value.into(),
        }
    }
}

/// An annotation term: synonyms, inclusions and exclusions come either as
/// `{"label": {...}}` objects or as bare localized strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Term {
    Labelled { label: LocalizedText },
    Plain(LocalizedText),
}

impl Term {
    pub fn text(&self) -> &str {
        match self {
            Self::Labelled { label } => &label.value,
            Self::Plain(text) => &text.value,
        }
    }
}

/// One node of the remote hierarchy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Stable identity URL
    #[serde(
        rename = "@id",
        alias = "uri",
        alias = "index",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<LocalizedText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<LocalizedText>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_kind: Option<String>,

    /// Ancestor URLs, primary parent first
    #[serde(default)]
    pub parent: Vec<String>,

    #[serde(default)]
    pub child: Vec<String>,

    #[serde(default)]
    pub is_leaf: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_in_kind: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_range: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonym: Vec<Term>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inclusion: Vec<Term>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusion: Vec<Term>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_note: Option<LocalizedText>,

    /// URL this document was fetched from; set by the crawler, not the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Entity {
    /// Returns the code when the source system assigned a non-empty one
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Deduplication key: the code when present, else the identity URL
    ///
    /// Grouping blocks carry no code, so they are told apart by URL.
    pub fn key(&self) -> String {
        match self.code() {
            Some(code) => code.to_string(),
            None => self
                .uri
                .clone()
                .or_else(|| self.source_url.clone())
                .unwrap_or_default(),
        }
    }

    /// Code shown on records: the code, else the block's code range or id
    pub fn display_code(&self) -> String {
        self.code()
            .or(self.code_range.as_deref())
            .or(self.block_id.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    pub fn class_kind(&self) -> Option<&str> {
        self.class_kind.as_deref()
    }

    pub fn title_text(&self) -> &str {
        self.title.as_ref().map(|t| t.value.as_str()).unwrap_or("")
    }

    pub fn definition_text(&self) -> &str {
        self.definition.as_ref().map(|t| t.value.as_str()).unwrap_or("")
    }

    pub fn coding_note_text(&self) -> &str {
        self.coding_note.as_ref().map(|t| t.value.as_str()).unwrap_or("")
    }

    /// First parent reference; multi-parent entities climb through it only
    pub fn primary_parent(&self) -> Option<&str> {
        self.parent.first().map(String::as_str)
    }

    /// Every URL this entity can be looked up by
    pub fn identity_urls(&self) -> impl Iterator<Item = &str> {
        self.uri.iter().chain(self.source_url.iter()).map(String::as_str)
    }

    /// The top of the release: no parent, no code and not a chapter
    pub fn is_release_root(&self) -> bool {
        self.parent.is_empty() && self.code().is_none() && self.class_kind() != Some("chapter")
    }

    pub fn synonyms(&self) -> Vec<String> {
        collect_terms(&self.synonym)
    }

    pub fn inclusions(&self) -> Vec<String> {
        collect_terms(&self.inclusion)
    }

    pub fn exclusions(&self) -> Vec<String> {
        collect_terms(&self.exclusion)
    }
}

fn collect_terms(terms: &[Term]) -> Vec<String> {
    terms
        .iter()
        .map(Term::text)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_linearization_entity() {
        let json = r#"{
            "@context": "http://id.who.int/icd/contexts/contextForLinearizationEntity.json",
            "@id": "http://id.who.int/icd/release/11/2024-01/mms/1435254666",
            "parent": ["http://id.who.int/icd/release/11/2024-01/mms/135352227"],
            "child": [
                "http://id.who.int/icd/release/11/2024-01/mms/1435254666/other",
                "http://id.who.int/icd/release/11/2024-01/mms/1435254666/unspecified"
            ],
            "code": "1A00",
            "title": {"@language": "en", "@value": "Cholera"},
            "definition": {"@language": "en", "@value": "Cholera is an acute illness."},
            "classKind": "category",
            "isLeaf": false,
            "synonym": [{"label": {"@language": "en", "@value": "Asiatic cholera"}}],
            "exclusion": [{"label": {"@language": "en", "@value": "Not cholera"}, "linearizationReference": "x"}],
            "codingNote": {"@language": "en", "@value": "Use additional code."}
        }"#;

        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.code(), Some("1A00"));
        assert_eq!(entity.title_text(), "Cholera");
        assert_eq!(entity.class_kind(), Some("category"));
        assert_eq!(entity.child.len(), 2);
        assert_eq!(
            entity.primary_parent(),
            Some("http://id.who.int/icd/release/11/2024-01/mms/135352227")
        );
        assert_eq!(entity.synonyms(), vec!["Asiatic cholera"]);
        assert_eq!(entity.exclusions(), vec!["Not cholera"]);
        assert_eq!(entity.coding_note_text(), "Use additional code.");
        assert!(!entity.is_leaf);
    }

    #[test]
    fn test_decode_plain_strings_and_defaults() {
        let json = r#"{"code": "1", "classKind": "chapter", "title": "Infections", "synonym": [{"@value": "a"}, "b"]}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();

        assert_eq!(entity.title_text(), "Infections");
        assert_eq!(entity.synonyms(), vec!["a", "b"]);
        assert!(entity.parent.is_empty());
        assert!(entity.child.is_empty());
        assert!(entity.uri.is_none());
    }

    #[test]
    fn test_key_prefers_code_then_url() {
        let mut entity = Entity {
            uri: Some("https://id.who.int/e/1".to_string()),
            source_url: Some("https://id.who.int/mms/1".to_string()),
            code: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(entity.key(), "https://id.who.int/e/1");

        entity.code = Some("1A00".to_string());
        assert_eq!(entity.key(), "1A00");

        entity.code = None;
        entity.uri = None;
        assert_eq!(entity.key(), "https://id.who.int/mms/1");
    }

    #[test]
    fn test_display_code_falls_back_to_range() {
        let entity = Entity {
            code_range: Some("1A00-1A09".to_string()),
            block_id: Some("BlockL2-1A0".to_string()),
            ..Default::default()
        };
        assert_eq!(entity.display_code(), "1A00-1A09");
    }

    #[test]
    fn test_release_root_detection() {
        let root = Entity {
            child: vec!["/c1".to_string()],
            ..Default::default()
        };
        assert!(root.is_release_root());

        let chapter = Entity {
            code: Some("01".to_string()),
            class_kind: Some("chapter".to_string()),
            ..Default::default()
        };
        assert!(!chapter.is_release_root());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_source_url() {
        let entity = Entity {
            code: Some("1A00".to_string()),
            source_url: Some("https://id.who.int/mms/1".to_string()),
            title: Some(LocalizedText::new("Cholera")),
            ..Default::default()
        };
        let json = serde_json::to_string(&entity).unwrap();
        let back: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entity);
    }
}
