use crate::model::{Classification, Entity};

/// Assigns an entity to exactly one taxonomy level
///
/// This `classKind` chain is the canonical classification. Rules are
/// evaluated in order and the first match wins:
///
/// 1. `chapter` is a CHAPTER
/// 2. `block` at depth 1 is a SECTION, deeper blocks are SUBSECTIONs.
///    A block whose depth is unknown is treated as depth 1.
/// 3. `subsection`, `category` and `precoordination` are SUBSECTIONs
/// 4. everything else, including `morbidity`, `mortality`, `foundation`
///    and a missing `classKind`, is a DIAGNOSIS
///
/// Other signals such as code shape or parent URL substrings are
/// deliberately not consulted.
pub fn classify(entity: &Entity) -> Classification {
    match entity.class_kind() {
        Some("chapter") => Classification::Chapter,
        Some("block") => match entity.depth_in_kind {
            Some(depth) if depth >= 2 => Classification::Subsection,
            _ => Classification::Section,
        },
        Some("subsection" | "category" | "precoordination") => Classification::Subsection,
        _ => Classification::Diagnosis,
    }
}
