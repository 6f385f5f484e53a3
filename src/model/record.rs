//! Classified, linked records handed to the output sinks

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four taxonomy levels an entity can be assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Chapter,
    Section,
    Subsection,
    Diagnosis,
}

impl Classification {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Section => "section",
            Self::Subsection => "subsection",
            Self::Diagnosis => "diagnosis",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "chapter" => Some(Self::Chapter),
            "section" => Some(Self::Section),
            "subsection" => Some(Self::Subsection),
            "diagnosis" => Some(Self::Diagnosis),
            _ => None,
        }
    }

    pub fn all() -> [Self; 4] {
        [Self::Chapter, Self::Section, Self::Subsection, Self::Diagnosis]
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub id: u32,
    pub code: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: u32,
    pub code: String,
    pub description: String,
    pub chapter_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionRecord {
    pub id: u32,
    pub code: String,
    pub description: String,
    pub chapter_id: Option<u32>,
    pub section_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub id: u32,
    pub code: String,
    pub description: String,
    pub chapter_id: Option<u32>,
    pub section_id: Option<u32>,
    pub subsection_id: Option<u32>,
    pub parent_diagnosis_id: Option<u32>,
    /// Starts false; flipped by a later update event when a child diagnosis links here
    pub has_subclassification: bool,
    pub is_infectious: bool,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub inclusions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub coding_notes: String,
    #[serde(default)]
    pub uri: Option<String>,
}

/// A record of exactly one taxonomy level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClassifiedRecord {
    Chapter(ChapterRecord),
    Section(SectionRecord),
    Subsection(SubsectionRecord),
    Diagnosis(DiagnosisRecord),
}

impl ClassifiedRecord {
    pub fn classification(&self) -> Classification {
        match self {
            Self::Chapter(_) => Classification::Chapter,
            Self::Section(_) => Classification::Section,
            Self::Subsection(_) => Classification::Subsection,
            Self::Diagnosis(_) => Classification::Diagnosis,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Chapter(r) => r.id,
            Self::Section(r) => r.id,
            Self::Subsection(r) => r.id,
            Self::Diagnosis(r) => r.id,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Chapter(r) => &r.code,
            Self::Section(r) => &r.code,
            Self::Subsection(r) => &r.code,
            Self::Diagnosis(r) => &r.code,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Chapter(r) => &r.description,
            Self::Section(r) => &r.description,
            Self::Subsection(r) => &r.description,
            Self::Diagnosis(r) => &r.description,
        }
    }

    /// Chapter link, absent for chapters themselves
    pub fn chapter_id(&self) -> Option<u32> {
        match self {
            Self::Chapter(_) => None,
            Self::Section(r) => r.chapter_id,
            Self::Subsection(r) => r.chapter_id,
            Self::Diagnosis(r) => r.chapter_id,
        }
    }
}
