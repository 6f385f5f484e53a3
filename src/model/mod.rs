//! Data model: raw API entities and the classified records derived from them

mod entity;
mod record;

pub use entity::{Entity, LocalizedText, Term};
pub use record::{
    ChapterRecord, Classification, ClassifiedRecord, DiagnosisRecord, SectionRecord,
    SubsectionRecord,
};
