use serde::{Deserialize, Serialize};

use geodx_core::{DiagnosisTask, TaskKey};

use crate::entities::EntityMention;
use crate::geo::GeoFeatures;
use crate::quality::QualityScore;

/// One task's raw outcome as produced by a worker, before cleaning.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub task: DiagnosisTask,
    pub content: String,
    pub latency_ms: u64,
    pub tokens_used: Option<u32>,
}

/// Per-execution context the pipeline needs to recognize entities.
#[derive(Debug, Clone)]
pub struct CleaningContext {
    pub main_brand: String,
    pub competitor_brands: Vec<String>,
    /// Substring matching ignores case when set (the default).
    pub case_insensitive: bool,
}

impl CleaningContext {
    #[must_use]
    pub fn new(main_brand: &str, competitor_brands: &[String]) -> Self {
        Self {
            main_brand: main_brand.to_owned(),
            competitor_brands: competitor_brands.to_vec(),
            case_insensitive: true,
        }
    }
}

/// The structured, scored output of the cleaning pipeline for one response.
///
/// Immutable once produced; owned by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub key: TaskKey,
    pub brand: String,
    pub is_main_brand: bool,
    pub model: String,
    pub question: String,
    pub text: String,
    pub latency_ms: u64,
    pub mentions: Vec<EntityMention>,
    pub brand_mention_count: usize,
    pub competitor_mention_count: usize,
    pub geo: GeoFeatures,
    pub quality: QualityScore,
    pub is_duplicate: bool,
    pub is_valid: bool,
    /// True for placeholder records of tasks whose retries were exhausted.
    pub failed: bool,
    pub warnings: Vec<String>,
    /// Per-step outputs keyed by step name.
    pub steps: serde_json::Map<String, serde_json::Value>,
}

impl CleanedRecord {
    /// Placeholder record for a task that never produced a response.
    ///
    /// Kept in the report so downstream aggregation can compute partial
    /// completeness; scores zero everywhere and carries the final error.
    #[must_use]
    pub fn failed_placeholder(task: &DiagnosisTask, error: &str) -> Self {
        let mut steps = serde_json::Map::new();
        steps.insert(
            "_failed".to_owned(),
            serde_json::json!({ "error": error }),
        );
        Self {
            key: task.key(),
            brand: task.brand.clone(),
            is_main_brand: task.is_main_brand,
            model: task.model.clone(),
            question: task.question.clone(),
            text: String::new(),
            latency_ms: 0,
            mentions: Vec::new(),
            brand_mention_count: 0,
            competitor_mention_count: 0,
            geo: GeoFeatures::empty(),
            quality: QualityScore::zero(&format!("task failed: {error}")),
            is_duplicate: false,
            is_valid: false,
            failed: true,
            warnings: vec![format!("task failed after retries: {error}")],
            steps,
        }
    }
}
