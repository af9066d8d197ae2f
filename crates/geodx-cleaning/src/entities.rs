//! Step 3: brand and competitor entity recognition.
//!
//! Plain substring search (case-insensitive by default) over the cleaned
//! text; each mention records its offset and a small surrounding context
//! window so later steps can score sentiment around the mention.

use serde::{Deserialize, Serialize};

use crate::types::CleaningContext;

const CONTEXT_WINDOW: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    Brand,
    Competitor,
}

/// One recognized mention of a configured brand name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub class: EntityClass,
    /// Character offset of the match in the cleaned text.
    pub offset: usize,
    /// Up to [`CONTEXT_WINDOW`] characters either side of the match.
    pub context: String,
}

/// Scan `text` for the main brand and every competitor.
///
/// Mentions are returned in ascending offset order.
pub(crate) fn recognize_entities(text: &str, ctx: &CleaningContext) -> Vec<EntityMention> {
    let mut mentions = Vec::new();
    scan_for(text, &ctx.main_brand, EntityClass::Brand, ctx.case_insensitive, &mut mentions);
    for competitor in &ctx.competitor_brands {
        scan_for(
            text,
            competitor,
            EntityClass::Competitor,
            ctx.case_insensitive,
            &mut mentions,
        );
    }
    mentions.sort_by_key(|m| m.offset);
    mentions
}

fn scan_for(
    text: &str,
    name: &str,
    class: EntityClass,
    case_insensitive: bool,
    out: &mut Vec<EntityMention>,
) {
    if name.is_empty() {
        return;
    }

    let haystack_chars: Vec<char> = text.chars().collect();
    let (haystack, needle) = if case_insensitive {
        (text.to_lowercase(), name.to_lowercase())
    } else {
        (text.to_owned(), name.to_owned())
    };

    let mut from = 0;
    while let Some(found) = haystack[from..].find(&needle) {
        let byte_offset = from + found;
        // Convert the byte offset into a character offset for the context
        // window; the lowercased haystack keeps the same char boundaries
        // for the scripts we handle.
        let char_offset = haystack[..byte_offset].chars().count();
        let start = char_offset.saturating_sub(CONTEXT_WINDOW);
        let name_chars = needle.chars().count();
        let end = (char_offset + name_chars + CONTEXT_WINDOW).min(haystack_chars.len());
        let context: String = haystack_chars[start..end].iter().collect();

        out.push(EntityMention {
            name: name.to_owned(),
            class,
            offset: char_offset,
            context,
        });
        from = byte_offset + needle.len();
    }
}

/// Count mentions per class.
pub(crate) fn mention_counts(mentions: &[EntityMention]) -> (usize, usize) {
    let brand = mentions
        .iter()
        .filter(|m| m.class == EntityClass::Brand)
        .count();
    (brand, mentions.len() - brand)
}
