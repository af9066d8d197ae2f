//! Incremental report aggregation.
//!
//! Each cleaned record is folded into running per-brand totals as it
//! arrives; share-of-voice, rankings, and the health score are recomputed
//! on demand rather than waiting for the whole matrix. Aggregation is
//! order-independent but performs no cross-call dedup — the engine feeds
//! each task key exactly once, and content duplicates flagged by the
//! cleaning pipeline are excluded from brand stats.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use geodx_cleaning::{CleanedRecord, Language};
use geodx_core::DiagnosisConfig;

use crate::state::DiagnosisState;

const HEALTH_WEIGHT_COMPLETION: f64 = 0.4;
const HEALTH_WEIGHT_GEO: f64 = 0.3;
const HEALTH_WEIGHT_SOURCES: f64 = 0.2;
const HEALTH_WEIGHT_SENTIMENT: f64 = 0.1;

/// One brand's aggregated standing in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandStanding {
    pub brand: String,
    pub is_main_brand: bool,
    /// Scored responses in which this brand was mentioned.
    pub mentions: u32,
    /// Scored responses whose task targeted this brand.
    pub responses: u32,
    /// `mentions / all scored responses × 100`.
    pub share_of_voice: f64,
    pub avg_sentiment: Option<f64>,
    pub avg_rank: Option<f64>,
    pub cited_sources: Vec<String>,
    /// Main-brand answers where only competitors appeared.
    pub interceptions: u32,
}

/// The incrementally-built diagnosis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub execution_id: Uuid,
    pub main_brand: String,
    /// Brand standings sorted by (share-of-voice desc, avg rank asc).
    pub rankings: Vec<BrandStanding>,
    pub records: Vec<CleanedRecord>,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub succeeded_tasks: u32,
    /// `succeeded / total × 100`.
    pub data_completeness: f64,
    pub health_score: f64,
    pub is_stub: bool,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
struct BrandStats {
    is_main: bool,
    mentioned_in: u32,
    responses_for: u32,
    sentiment_sum: f64,
    sentiment_n: u32,
    rank_sum: f64,
    rank_n: u32,
    sources: BTreeSet<String>,
    interceptions: u32,
}

/// Folds cleaned records into running totals.
pub struct ReportBuilder {
    execution_id: Uuid,
    main_brand: String,
    brands: Vec<String>,
    total_tasks: u32,
    completed: u32,
    succeeded: u32,
    /// Non-failed, non-duplicate records — the share-of-voice denominator.
    scored_responses: u32,
    geo_complete: u32,
    sentiment_valid: u32,
    stats: HashMap<String, BrandStats>,
    records: Vec<CleanedRecord>,
    warnings: Vec<String>,
}

impl ReportBuilder {
    #[must_use]
    pub fn new(execution_id: Uuid, config: &DiagnosisConfig, total_tasks: u32) -> Self {
        let brands = config.all_brands();
        let mut stats = HashMap::new();
        for brand in &brands {
            stats.insert(
                brand.clone(),
                BrandStats {
                    is_main: *brand == config.main_brand,
                    ..BrandStats::default()
                },
            );
        }
        Self {
            execution_id,
            main_brand: config.main_brand.clone(),
            brands,
            total_tasks,
            completed: 0,
            succeeded: 0,
            scored_responses: 0,
            geo_complete: 0,
            sentiment_valid: 0,
            stats,
            records: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Fold one record into the running totals.
    ///
    /// Call exactly once per task result; order does not matter. Failed
    /// placeholders count toward completeness only; duplicate-flagged
    /// records are kept in the record list but excluded from brand stats.
    pub fn add_record(&mut self, record: CleanedRecord) {
        self.completed += 1;
        if record.failed {
            self.records.push(record);
            return;
        }
        self.succeeded += 1;

        if record.is_duplicate {
            self.warnings.push(format!(
                "duplicate content for {} excluded from aggregation",
                record.key
            ));
            self.records.push(record);
            return;
        }

        self.scored_responses += 1;

        if record.geo.language != Language::Unknown && record.geo.sentence_count > 0 {
            self.geo_complete += 1;
        }

        // Mention totals: a scored response counts for every brand it names.
        let mentioned: Vec<String> = self
            .brands
            .iter()
            .filter(|brand| {
                let lower = brand.to_lowercase();
                record.mentions.iter().any(|m| m.name.to_lowercase() == lower)
            })
            .cloned()
            .collect();
        for brand in mentioned {
            if let Some(stats) = self.stats.get_mut(&brand) {
                stats.mentioned_in += 1;
            }
        }

        // Target-brand totals: sentiment, rank, sources, interception.
        if let Some(stats) = self.stats.get_mut(&record.brand) {
            stats.responses_for += 1;

            let sentiment = f64::from(record.geo.sentiment);
            if (-1.0..=1.0).contains(&sentiment) {
                stats.sentiment_sum += sentiment;
                stats.sentiment_n += 1;
                self.sentiment_valid += 1;
            } else {
                self.warnings.push(format!(
                    "sentiment {sentiment} for {} outside [-1, 1]; excluded from average",
                    record.key
                ));
            }

            if let Some(rank) = record.geo.brand_rank {
                stats.rank_sum += f64::from(rank);
                stats.rank_n += 1;
            }

            stats.sources.extend(record.geo.cited_sources.iter().cloned());

            if record.is_main_brand && record.geo.competitor_interception {
                stats.interceptions += 1;
            }
        }

        self.records.push(record);
    }

    #[must_use]
    pub fn completed(&self) -> u32 {
        self.completed
    }

    #[must_use]
    pub fn succeeded(&self) -> u32 {
        self.succeeded
    }

    /// Materialize the report for the current totals.
    #[must_use]
    pub fn build(&self, state: DiagnosisState) -> AggregatedReport {
        let mut rankings: Vec<BrandStanding> = self
            .brands
            .iter()
            .filter_map(|brand| self.stats.get(brand).map(|s| standing(brand, s, self.scored_responses)))
            .collect();

        // Mention rate descending, then average rank ascending (unranked
        // brands last), then name for a stable order.
        rankings.sort_by(|a, b| {
            b.share_of_voice
                .partial_cmp(&a.share_of_voice)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| match (a.avg_rank, b.avg_rank) {
                    (Some(ra), Some(rb)) => {
                        ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
                    }
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.brand.cmp(&b.brand))
        });

        let data_completeness = if self.total_tasks == 0 {
            0.0
        } else {
            f64::from(self.succeeded) / f64::from(self.total_tasks) * 100.0
        };

        AggregatedReport {
            execution_id: self.execution_id,
            main_brand: self.main_brand.clone(),
            rankings,
            records: self.records.clone(),
            total_tasks: self.total_tasks,
            completed_tasks: self.completed,
            succeeded_tasks: self.succeeded,
            data_completeness,
            health_score: self.health_score(),
            is_stub: state != DiagnosisState::Completed,
            warnings: self.warnings.clone(),
            generated_at: Utc::now(),
        }
    }

    /// Weighted blend of completion rate, GEO completeness, source
    /// citations, and sentiment validity, each on a 0–100 scale.
    fn health_score(&self) -> f64 {
        if self.total_tasks == 0 || self.succeeded == 0 {
            return 0.0;
        }
        let completion = f64::from(self.succeeded) / f64::from(self.total_tasks) * 100.0;
        let geo = f64::from(self.geo_complete) / f64::from(self.succeeded) * 100.0;
        let distinct_sources: BTreeSet<&String> =
            self.stats.values().flat_map(|s| s.sources.iter()).collect();
        #[allow(clippy::cast_precision_loss)]
        let sources = (distinct_sources.len().min(10) as f64) / 10.0 * 100.0;
        let sentiment = f64::from(self.sentiment_valid) / f64::from(self.succeeded) * 100.0;

        HEALTH_WEIGHT_COMPLETION * completion
            + HEALTH_WEIGHT_GEO * geo
            + HEALTH_WEIGHT_SOURCES * sources
            + HEALTH_WEIGHT_SENTIMENT * sentiment
    }
}

fn standing(brand: &str, stats: &BrandStats, scored_responses: u32) -> BrandStanding {
    let share_of_voice = if scored_responses == 0 {
        0.0
    } else {
        f64::from(stats.mentioned_in) / f64::from(scored_responses) * 100.0
    };
    BrandStanding {
        brand: brand.to_owned(),
        is_main_brand: stats.is_main,
        mentions: stats.mentioned_in,
        responses: stats.responses_for,
        share_of_voice,
        avg_sentiment: (stats.sentiment_n > 0)
            .then(|| stats.sentiment_sum / f64::from(stats.sentiment_n)),
        avg_rank: (stats.rank_n > 0).then(|| stats.rank_sum / f64::from(stats.rank_n)),
        cited_sources: stats.sources.iter().cloned().collect(),
        interceptions: stats.interceptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodx_cleaning::{CleaningContext, CleaningPipeline, DedupIndex, RawResponse};
    use geodx_core::DiagnosisTask;

    fn config() -> DiagnosisConfig {
        DiagnosisConfig {
            main_brand: "Acme Water".to_string(),
            competitor_brands: vec!["Rival Springs".to_string()],
            questions: vec!["What do you know about {brandName}?".to_string()],
            selected_models: vec!["gpt-4o-mini".to_string()],
            user_id: "u".to_string(),
        }
    }

    fn task(brand: &str, is_main: bool, question_index: usize) -> DiagnosisTask {
        DiagnosisTask {
            task_id: Uuid::new_v4(),
            execution_id: Uuid::new_v4(),
            question_index,
            question: format!("What do you know about {brand}?"),
            model: "gpt-4o-mini".to_string(),
            brand: brand.to_string(),
            is_main_brand: is_main,
        }
    }

    fn record_for(brand: &str, is_main: bool, question_index: usize, text: &str) -> CleanedRecord {
        let pipeline = CleaningPipeline::new();
        let ctx = CleaningContext::new("Acme Water", &["Rival Springs".to_string()]);
        // Fresh index per record: content dedup is exercised separately.
        let mut dedup = DedupIndex::default();
        pipeline.clean(
            &RawResponse {
                task: task(brand, is_main, question_index),
                content: text.to_string(),
                latency_ms: 10,
                tokens_used: None,
            },
            &ctx,
            &mut dedup,
        )
    }

    fn sample_records() -> Vec<CleanedRecord> {
        vec![
            record_for(
                "Acme Water",
                true,
                0,
                "Acme Water is a trusted brand. See https://example.com/acme for details.",
            ),
            record_for("Acme Water", true, 1, "Rival Springs leads; Acme Water trails."),
            record_for("Rival Springs", false, 0, "Rival Springs is a reliable choice."),
            record_for("Rival Springs", false, 1, "Hard to say much about bottled water."),
        ]
    }

    #[test]
    fn share_of_voice_and_ranking_are_order_independent() {
        let records = sample_records();

        let mut forward = ReportBuilder::new(Uuid::new_v4(), &config(), 4);
        for r in records.clone() {
            forward.add_record(r);
        }
        let mut reverse = ReportBuilder::new(Uuid::new_v4(), &config(), 4);
        for r in records.into_iter().rev() {
            reverse.add_record(r);
        }

        let a = forward.build(DiagnosisState::Completed);
        let b = reverse.build(DiagnosisState::Completed);

        let sov_a: Vec<(String, f64)> = a
            .rankings
            .iter()
            .map(|s| (s.brand.clone(), s.share_of_voice))
            .collect();
        let sov_b: Vec<(String, f64)> = b
            .rankings
            .iter()
            .map(|s| (s.brand.clone(), s.share_of_voice))
            .collect();
        assert_eq!(sov_a, sov_b, "ranking must not depend on arrival order");
    }

    #[test]
    fn feeding_a_duplicate_record_twice_changes_the_result() {
        let records = sample_records();

        let mut once = ReportBuilder::new(Uuid::new_v4(), &config(), 4);
        for r in records.clone() {
            once.add_record(r);
        }
        let mut twice = ReportBuilder::new(Uuid::new_v4(), &config(), 4);
        for r in records.clone() {
            twice.add_record(r);
        }
        twice.add_record(records[0].clone());

        let a = once.build(DiagnosisState::Completed);
        let b = twice.build(DiagnosisState::Completed);

        let sov = |report: &AggregatedReport, brand: &str| {
            report
                .rankings
                .iter()
                .find(|s| s.brand == brand)
                .map(|s| s.share_of_voice)
        };
        assert_ne!(
            sov(&a, "Rival Springs"),
            sov(&b, "Rival Springs"),
            "the aggregator performs no implicit dedup"
        );
    }

    #[test]
    fn out_of_range_sentiment_is_excluded_with_warning() {
        let mut record = record_for("Acme Water", true, 0, "Acme Water is a trusted brand.");
        record.geo.sentiment = 5.0;

        let mut builder = ReportBuilder::new(Uuid::new_v4(), &config(), 1);
        builder.add_record(record);
        let report = builder.build(DiagnosisState::Completed);

        let main = report
            .rankings
            .iter()
            .find(|s| s.brand == "Acme Water")
            .expect("main brand standing");
        assert_eq!(main.avg_sentiment, None);
        assert!(report.warnings.iter().any(|w| w.contains("outside [-1, 1]")));
    }

    #[test]
    fn duplicate_flagged_records_are_kept_but_not_aggregated() {
        let mut builder = ReportBuilder::new(Uuid::new_v4(), &config(), 2);
        builder.add_record(record_for("Acme Water", true, 0, "Acme Water wins."));
        let mut dup = record_for("Acme Water", true, 1, "Acme Water wins.");
        dup.is_duplicate = true;
        builder.add_record(dup);

        let report = builder.build(DiagnosisState::Completed);
        assert_eq!(report.records.len(), 2);
        let main = report
            .rankings
            .iter()
            .find(|s| s.brand == "Acme Water")
            .expect("standing");
        assert_eq!(main.mentions, 1, "duplicate must not count toward mentions");
    }

    #[test]
    fn partial_failure_yields_expected_completeness() {
        let mut builder = ReportBuilder::new(Uuid::new_v4(), &config(), 10);
        for i in 0..6 {
            builder.add_record(record_for("Acme Water", true, i, "Acme Water is trusted."));
        }
        for i in 6..10 {
            let t = task("Acme Water", true, i);
            builder.add_record(CleanedRecord::failed_placeholder(&t, "rate limited"));
        }

        let report = builder.build(DiagnosisState::PartialCompleted);
        assert!((report.data_completeness - 60.0).abs() < f64::EPSILON);
        assert_eq!(report.completed_tasks, 10);
        assert_eq!(report.succeeded_tasks, 6);
        assert!(report.is_stub);
    }

    #[test]
    fn successful_run_has_positive_health_and_is_not_a_stub() {
        let mut builder = ReportBuilder::new(Uuid::new_v4(), &config(), 4);
        for r in sample_records() {
            builder.add_record(r);
        }
        let report = builder.build(DiagnosisState::Completed);
        assert!(report.health_score > 0.0);
        assert!(!report.is_stub);
        assert!((report.data_completeness - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_failed_run_has_zero_health() {
        let mut builder = ReportBuilder::new(Uuid::new_v4(), &config(), 2);
        for i in 0..2 {
            let t = task("Acme Water", true, i);
            builder.add_record(CleanedRecord::failed_placeholder(&t, "auth failed"));
        }
        let report = builder.build(DiagnosisState::Failed);
        assert_eq!(report.health_score, 0.0);
        assert_eq!(report.succeeded_tasks, 0);
        assert!(report.is_stub);
    }
}
