//! Step 4: GEO-analysis preparation.
//!
//! Derives the document-level features the brand scorer consumes: length,
//! sentence count, language, number/URL presence, cited sources, the target
//! brand's position and rank among mentioned brands, sentiment, and
//! competitor interception.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::entities::{EntityClass, EntityMention};

const MAX_SENTENCES: usize = 200;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)>"']+"#).expect("url regex is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Chinese,
    English,
    Unknown,
}

/// Document-level features for one cleaned response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoFeatures {
    pub char_len: usize,
    /// Capped at 200.
    pub sentence_count: usize,
    pub language: Language,
    pub has_numbers: bool,
    pub has_urls: bool,
    pub cited_sources: Vec<String>,
    /// Whether the task's target brand appears in the answer.
    pub brand_mentioned: bool,
    pub brand_first_offset: Option<usize>,
    /// 1 + distinct other brands mentioned before the target's first
    /// mention; `None` when the target is absent.
    pub brand_rank: Option<u32>,
    /// Lexicon sentiment in `[-1, 1]`.
    pub sentiment: f32,
    /// True when a competitor appears in an answer about the main brand
    /// that never mentions the main brand itself.
    pub competitor_interception: bool,
}

impl GeoFeatures {
    /// Features of a record with no usable text (failed tasks).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            char_len: 0,
            sentence_count: 0,
            language: Language::Unknown,
            has_numbers: false,
            has_urls: false,
            cited_sources: Vec::new(),
            brand_mentioned: false,
            brand_first_offset: None,
            brand_rank: None,
            sentiment: 0.0,
            competitor_interception: false,
        }
    }
}

/// Build [`GeoFeatures`] from the cleaned text and the recognized mentions.
pub(crate) fn prepare_geo(
    text: &str,
    mentions: &[EntityMention],
    target_brand: &str,
    is_main_brand_task: bool,
) -> GeoFeatures {
    let target_lower = target_brand.to_lowercase();
    let target_mentions: Vec<&EntityMention> = mentions
        .iter()
        .filter(|m| m.name.to_lowercase() == target_lower)
        .collect();

    let brand_first_offset = target_mentions.iter().map(|m| m.offset).min();

    let brand_rank = brand_first_offset.map(|first| {
        let ahead: HashSet<&str> = mentions
            .iter()
            .filter(|m| m.offset < first && m.name.to_lowercase() != target_lower)
            .map(|m| m.name.as_str())
            .collect();
        u32::try_from(ahead.len()).unwrap_or(u32::MAX).saturating_add(1)
    });

    let competitor_mentioned = mentions.iter().any(|m| m.class == EntityClass::Competitor);

    GeoFeatures {
        char_len: text.chars().count(),
        sentence_count: count_sentences(text),
        language: detect_language(text),
        has_numbers: text.chars().any(|c| c.is_ascii_digit()),
        has_urls: URL_RE.is_match(text),
        cited_sources: extract_sources(text),
        brand_mentioned: brand_first_offset.is_some(),
        brand_first_offset,
        brand_rank,
        sentiment: lexicon_score(text),
        competitor_interception: is_main_brand_task
            && brand_first_offset.is_none()
            && competitor_mentioned,
    }
}

fn count_sentences(text: &str) -> usize {
    text.split(['.', '!', '?', '。', '！', '？'])
        .filter(|segment| !segment.trim().is_empty())
        .count()
        .min(MAX_SENTENCES)
}

/// Chinese if more than 10% of chars are CJK; else English if ASCII letters
/// dominate; else unknown.
fn detect_language(text: &str) -> Language {
    let total = text.chars().count();
    if total == 0 {
        return Language::Unknown;
    }
    let cjk = text
        .chars()
        .filter(|c| ('\u{4E00}'..='\u{9FFF}').contains(c))
        .count();
    if cjk * 10 > total {
        return Language::Chinese;
    }
    let ascii_alpha = text.chars().filter(char::is_ascii_alphabetic).count();
    if ascii_alpha * 2 > total {
        Language::English
    } else {
        Language::Unknown
    }
}

/// URLs cited in the answer, deduplicated in first-seen order.
fn extract_sources(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    URL_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_owned())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Generic brand-reputation word weights.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` are negative. The final score is clamped to `[-1.0, 1.0]`.
const LEXICON: &[(&str, f32)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("best", 0.5),
    ("love", 0.5),
    ("recommend", 0.4),
    ("recommended", 0.4),
    ("trusted", 0.5),
    ("trustworthy", 0.5),
    ("reliable", 0.4),
    ("quality", 0.3),
    ("popular", 0.3),
    ("leading", 0.4),
    ("innovative", 0.4),
    ("premium", 0.3),
    ("affordable", 0.3),
    ("strong", 0.3),
    ("reputable", 0.5),
    ("established", 0.3),
    ("growing", 0.3),
    // Negative signals
    ("bad", -0.4),
    ("poor", -0.4),
    ("worst", -0.6),
    ("terrible", -0.6),
    ("avoid", -0.5),
    ("scam", -0.8),
    ("fake", -0.6),
    ("recall", -0.7),
    ("lawsuit", -0.5),
    ("complaint", -0.4),
    ("complaints", -0.4),
    ("unreliable", -0.5),
    ("overpriced", -0.4),
    ("controversy", -0.4),
    ("unsafe", -0.6),
    ("failed", -0.4),
    ("failure", -0.4),
    ("decline", -0.3),
    ("problem", -0.3),
    ("concern", -0.3),
];

/// Score a text string using the reputation lexicon.
///
/// Splits text into lowercase words, sums matching weights, and clamps
/// the result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown text.
#[must_use]
pub(crate) fn lexicon_score(text: &str) -> f32 {
    let mut score = 0.0_f32;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        for &(lex_word, weight) in LEXICON {
            if w == lex_word {
                score += weight;
                break;
            }
        }
    }
    score.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::recognize_entities;
    use crate::types::CleaningContext;

    fn ctx() -> CleaningContext {
        CleaningContext::new(
            "Acme Water",
            &["Rival Springs".to_string(), "Blue Peak".to_string()],
        )
    }

    fn geo_for(text: &str, target: &str, is_main: bool) -> GeoFeatures {
        let mentions = recognize_entities(text, &ctx());
        prepare_geo(text, &mentions, target, is_main)
    }

    #[test]
    fn brand_rank_counts_brands_mentioned_first() {
        let text = "Top picks: Rival Springs, Blue Peak, and Acme Water.";
        let geo = geo_for(text, "Acme Water", true);
        assert!(geo.brand_mentioned);
        assert_eq!(geo.brand_rank, Some(3));
    }

    #[test]
    fn brand_rank_is_one_when_brand_leads() {
        let text = "Acme Water is the leader, ahead of Rival Springs.";
        let geo = geo_for(text, "Acme Water", true);
        assert_eq!(geo.brand_rank, Some(1));
    }

    #[test]
    fn absent_brand_has_no_rank() {
        let geo = geo_for("Rival Springs dominates the market.", "Acme Water", true);
        assert!(!geo.brand_mentioned);
        assert_eq!(geo.brand_rank, None);
    }

    #[test]
    fn interception_when_only_competitors_appear_in_main_brand_answer() {
        let geo = geo_for("Try Rival Springs instead.", "Acme Water", true);
        assert!(geo.competitor_interception);
    }

    #[test]
    fn no_interception_when_main_brand_is_mentioned() {
        let geo = geo_for("Acme Water beats Rival Springs.", "Acme Water", true);
        assert!(!geo.competitor_interception);
    }

    #[test]
    fn no_interception_for_competitor_tasks() {
        let geo = geo_for("Blue Peak is okay.", "Rival Springs", false);
        assert!(!geo.competitor_interception);
    }

    #[test]
    fn detects_english() {
        assert_eq!(
            detect_language("This is a plain English sentence."),
            Language::English
        );
    }

    #[test]
    fn detects_chinese() {
        assert_eq!(detect_language("这个品牌的矿泉水质量很好"), Language::Chinese);
    }

    #[test]
    fn empty_text_is_unknown_language() {
        assert_eq!(detect_language(""), Language::Unknown);
    }

    #[test]
    fn extracts_and_dedups_cited_sources() {
        let text = "See https://example.com/a and https://example.com/b. Also https://example.com/a.";
        let sources = extract_sources(text);
        assert_eq!(
            sources,
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn sentence_count_caps() {
        let text = "a. ".repeat(500);
        assert_eq!(count_sentences(&text), 200);
    }

    #[test]
    fn lexicon_scores_positive_and_negative() {
        assert!(lexicon_score("a trusted and reliable brand") > 0.0);
        assert!(lexicon_score("avoid this scam") < 0.0);
        assert_eq!(lexicon_score(""), 0.0);
    }

    #[test]
    fn lexicon_clamps_to_unit_range() {
        let positive = "trusted reliable excellent best love recommend quality leading";
        assert_eq!(lexicon_score(positive), 1.0);
        let negative = "scam fake recall lawsuit worst terrible avoid unsafe";
        assert_eq!(lexicon_score(negative), -1.0);
    }
}
