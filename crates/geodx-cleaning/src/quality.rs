//! Step 5: quality scoring.
//!
//! Weighted blend of length, completeness, relevance, and structure, each
//! on a 0–100 scale. The weight set must sum to 1.0.

use serde::{Deserialize, Serialize};

use crate::geo::{GeoFeatures, Language};

const MIN_ACCEPTABLE_LEN: usize = 50;
const IDEAL_LEN: usize = 800;
const MAX_ACCEPTABLE_LEN: usize = 3_000;

/// Component weights; defaults sum to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct QualityWeights {
    pub length: f32,
    pub completeness: f32,
    pub relevance: f32,
    pub structure: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            length: 0.30,
            completeness: 0.30,
            relevance: 0.30,
            structure: 0.10,
        }
    }
}

impl QualityWeights {
    #[must_use]
    pub fn sum(&self) -> f32 {
        self.length + self.completeness + self.relevance + self.structure
    }
}

/// Scored quality of one cleaned record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    /// 0–100.
    pub overall: f32,
    pub length: f32,
    pub completeness: f32,
    pub relevance: f32,
    pub structure: f32,
    pub issues: Vec<String>,
}

impl QualityScore {
    /// Score for a record with no usable content.
    #[must_use]
    pub fn zero(issue: &str) -> Self {
        Self {
            overall: 0.0,
            length: 0.0,
            completeness: 0.0,
            relevance: 0.0,
            structure: 0.0,
            issues: vec![issue.to_owned()],
        }
    }
}

/// Score one cleaned record.
pub(crate) fn score_quality(
    text: &str,
    question: &str,
    geo: &GeoFeatures,
    weights: QualityWeights,
) -> QualityScore {
    let mut issues = Vec::new();

    let length = length_score(geo.char_len);
    if geo.char_len < MIN_ACCEPTABLE_LEN {
        issues.push(format!(
            "content shorter than the acceptable minimum of {MIN_ACCEPTABLE_LEN} characters"
        ));
    }
    if geo.char_len > MAX_ACCEPTABLE_LEN {
        issues.push(format!(
            "content longer than the acceptable maximum of {MAX_ACCEPTABLE_LEN} characters"
        ));
    }

    let completeness = completeness_score(geo);
    if completeness < 100.0 {
        issues.push("one or more GEO fields are missing".to_owned());
    }

    let relevance = relevance_score(text, question, geo);
    if !geo.brand_mentioned {
        issues.push("target brand is not mentioned in the answer".to_owned());
    }

    let structure = structure_score(text, geo);

    let overall = (weights.length * length
        + weights.completeness * completeness
        + weights.relevance * relevance
        + weights.structure * structure)
        .clamp(0.0, 100.0);

    QualityScore {
        overall,
        length,
        completeness,
        relevance,
        structure,
        issues,
    }
}

/// Triangular length curve: linear ramp up to the ideal length, flat through
/// the acceptable band, then a symmetric ramp down beyond the acceptable
/// maximum. Below the acceptable minimum the score degrades linearly to 0.
#[allow(clippy::cast_precision_loss)]
fn length_score(len: usize) -> f32 {
    if len == 0 {
        return 0.0;
    }
    let len = len as f32;
    let min = MIN_ACCEPTABLE_LEN as f32;
    let ideal = IDEAL_LEN as f32;
    let max = MAX_ACCEPTABLE_LEN as f32;

    if len < min {
        40.0 * len / min
    } else if len <= ideal {
        40.0 + 60.0 * (len - min) / (ideal - min)
    } else if len <= max {
        100.0
    } else {
        // Same slope as the up-ramp, mirrored.
        (100.0 - 60.0 * (len - max) / (ideal - min)).max(0.0)
    }
}

/// Fraction of required GEO fields present.
#[allow(clippy::cast_precision_loss)]
fn completeness_score(geo: &GeoFeatures) -> f32 {
    let required = [
        geo.char_len > 0,
        geo.sentence_count > 0,
        geo.language != Language::Unknown,
        geo.brand_mentioned,
        geo.has_numbers || !geo.cited_sources.is_empty(),
    ];
    let present = required.iter().filter(|&&p| p).count();
    100.0 * present as f32 / required.len() as f32
}

/// Keyword overlap with the question plus a bonus for mentioning the brand.
#[allow(clippy::cast_precision_loss)]
fn relevance_score(text: &str, question: &str, geo: &GeoFeatures) -> f32 {
    let text_lower = text.to_lowercase();
    let keywords: Vec<String> = question
        .to_lowercase()
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_owned())
        .filter(|w| w.chars().count() > 3)
        .collect();

    let overlap = if keywords.is_empty() {
        0.0
    } else {
        let hits = keywords.iter().filter(|k| text_lower.contains(*k)).count();
        60.0 * hits as f32 / keywords.len() as f32
    };

    let brand_bonus = if geo.brand_mentioned { 40.0 } else { 0.0 };
    overlap + brand_bonus
}

fn structure_score(text: &str, geo: &GeoFeatures) -> f32 {
    let has_control = text
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\r' && c != '\t');
    if has_control {
        return 0.0;
    }
    match geo.sentence_count {
        0 => 0.0,
        1 => 50.0,
        _ => 100.0,
    }
}
