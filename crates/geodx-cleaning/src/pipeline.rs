//! Cleaning pipeline orchestration.

use crate::dedup::DedupIndex;
use crate::entities::{mention_counts, recognize_entities};
use crate::extract::extract_text;
use crate::geo::prepare_geo;
use crate::quality::{score_quality, QualityWeights};
use crate::types::{CleanedRecord, CleaningContext, RawResponse};
use crate::validate::validate;

/// Orchestrates the six cleaning steps for one execution.
///
/// The pipeline itself is stateless apart from the quality weights; the
/// per-execution dedup index is passed in by the caller so one index spans
/// every record of an execution.
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    weights: QualityWeights,
}

impl CleaningPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            weights: QualityWeights::default(),
        }
    }

    #[must_use]
    pub fn with_weights(weights: QualityWeights) -> Self {
        Self { weights }
    }

    /// Run the full pipeline for one raw response.
    ///
    /// 1. Extract: strip markup, unescape, collapse whitespace, bound length.
    /// 2. Dedup: hash the normalized text; flag repeats within the execution.
    /// 3. Entities: find brand/competitor mentions with offsets and context.
    /// 4. GEO: derive document features, rank, sentiment, interception.
    /// 5. Quality: weighted 0–100 score with issues.
    /// 6. Validate: rule checks; violations become issues, never drops.
    ///
    /// Never fails: an empty response yields a zero-scored record with
    /// warnings rather than an error.
    #[must_use]
    pub fn clean(
        &self,
        raw: &RawResponse,
        ctx: &CleaningContext,
        dedup: &mut DedupIndex,
    ) -> CleanedRecord {
        let mut warnings = Vec::new();
        let mut steps = serde_json::Map::new();

        // Step 1: text extraction.
        let extracted = extract_text(&raw.content);
        warnings.extend(extracted.warnings.iter().cloned());
        steps.insert(
            "extract".to_owned(),
            serde_json::json!({
                "original_len": extracted.original_len,
                "cleaned_len": extracted.text.chars().count(),
                "truncated": extracted.truncated,
            }),
        );
        let text = extracted.text;

        // Step 2: deduplication. Duplicates are flagged, not dropped.
        let (hash, is_duplicate) = dedup.observe(&text);
        if is_duplicate {
            warnings.push("content duplicates an earlier response".to_owned());
        }
        steps.insert(
            "dedup".to_owned(),
            serde_json::json!({ "hash": hash, "duplicate": is_duplicate }),
        );

        // Step 3: entity recognition.
        let mentions = recognize_entities(&text, ctx);
        let (brand_mention_count, competitor_mention_count) = mention_counts(&mentions);
        steps.insert(
            "entities".to_owned(),
            serde_json::json!({
                "brand_mentions": brand_mention_count,
                "competitor_mentions": competitor_mention_count,
            }),
        );

        // Step 4: GEO preparation.
        let geo = prepare_geo(&text, &mentions, &raw.task.brand, raw.task.is_main_brand);
        steps.insert(
            "geo".to_owned(),
            serde_json::to_value(&geo).unwrap_or(serde_json::Value::Null),
        );

        // Step 5: quality scoring.
        let mut quality = score_quality(&text, &raw.task.question, &geo, self.weights);
        steps.insert(
            "quality".to_owned(),
            serde_json::to_value(&quality).unwrap_or(serde_json::Value::Null),
        );

        // Step 6: validation. Violations feed back into quality issues and
        // the record's warnings.
        let validation = validate(&text);
        for rule in &validation.violations {
            quality.issues.push(format!("validation rule violated: {rule}"));
            warnings.push(format!("validation rule violated: {rule}"));
        }
        steps.insert(
            "validate".to_owned(),
            serde_json::json!({
                "is_valid": validation.is_valid,
                "violations": validation.violations,
            }),
        );

        if !warnings.is_empty() {
            tracing::debug!(
                task = %raw.task.key(),
                warnings = warnings.len(),
                "cleaning produced warnings"
            );
        }

        CleanedRecord {
            key: raw.task.key(),
            brand: raw.task.brand.clone(),
            is_main_brand: raw.task.is_main_brand,
            model: raw.task.model.clone(),
            question: raw.task.question.clone(),
            text,
            latency_ms: raw.latency_ms,
            mentions,
            brand_mention_count,
            competitor_mention_count,
            geo,
            quality,
            is_duplicate,
            is_valid: validation.is_valid,
            failed: false,
            warnings,
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodx_core::DiagnosisTask;
    use uuid::Uuid;

    fn task(brand: &str, is_main: bool) -> DiagnosisTask {
        DiagnosisTask {
            task_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            question_index: 0,
            question: format!("What do you know about {brand}?"),
            model: "gpt-4o-mini".to_string(),
            brand: brand.to_string(),
            is_main_brand: is_main,
        }
    }

    fn raw(brand: &str, content: &str) -> RawResponse {
        RawResponse {
            task: task(brand, true),
            content: content.to_string(),
            latency_ms: 120,
            tokens_used: Some(64),
        }
    }

    fn ctx() -> CleaningContext {
        CleaningContext::new("Acme Water", &["Rival Springs".to_string()])
    }

    #[test]
    fn clean_produces_all_step_outputs() {
        let pipeline = CleaningPipeline::new();
        let mut dedup = DedupIndex::default();
        let record = pipeline.clean(
            &raw("Acme Water", "<p>Acme Water is a trusted brand.</p>"),
            &ctx(),
            &mut dedup,
        );

        for step in ["extract", "dedup", "entities", "geo", "quality", "validate"] {
            assert!(record.steps.contains_key(step), "missing step output: {step}");
        }
        assert!(record.geo.brand_mentioned);
        assert!(record.is_valid);
        assert!(!record.failed);
    }

    #[test]
    fn clean_flags_duplicates_across_calls() {
        let pipeline = CleaningPipeline::new();
        let mut dedup = DedupIndex::default();
        let first = pipeline.clean(&raw("Acme Water", "Same answer."), &ctx(), &mut dedup);
        let second = pipeline.clean(&raw("Acme Water", "Same answer."), &ctx(), &mut dedup);

        assert!(!first.is_duplicate);
        assert!(second.is_duplicate);
        assert!(second.warnings.iter().any(|w| w.contains("duplicates")));
    }

    #[test]
    fn clean_handles_empty_content_without_error() {
        let pipeline = CleaningPipeline::new();
        let mut dedup = DedupIndex::default();
        let record = pipeline.clean(&raw("Acme Water", ""), &ctx(), &mut dedup);

        assert!(record.text.is_empty());
        assert!(!record.is_valid);
        assert!(record.quality.overall <= 1.0);
        assert!(!record.warnings.is_empty());
    }

    #[test]
    fn failed_placeholder_is_marked_and_scored_zero() {
        let record = CleanedRecord::failed_placeholder(&task("Acme Water", true), "rate limited");
        assert!(record.failed);
        assert_eq!(record.quality.overall, 0.0);
        assert!(record.steps.contains_key("_failed"));
        assert!(!record.is_valid);
    }

    #[test]
    fn validation_violations_surface_as_quality_issues() {
        let pipeline = CleaningPipeline::new();
        let mut dedup = DedupIndex::default();
        let record = pipeline.clean(&raw("Acme Water", ""), &ctx(), &mut dedup);
        assert!(record
            .quality
            .issues
            .iter()
            .any(|i| i.contains("non_empty")));
    }
}
