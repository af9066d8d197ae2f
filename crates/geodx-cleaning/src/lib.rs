//! Cleaning pipeline: raw AI answers in, structured scored records out.
//!
//! Steps run in a fixed order (text extraction → deduplication → entity
//! recognition → GEO preparation → quality scoring → validation). Steps add
//! warnings without halting the pipeline; each step records its output
//! keyed by step name so callers can inspect any step's contribution
//! without re-running it.

mod dedup;
mod entities;
mod extract;
mod geo;
mod pipeline;
mod quality;
mod types;
mod validate;

pub use dedup::{DedupIndex, HashMode};
pub use entities::{EntityClass, EntityMention};
pub use geo::{GeoFeatures, Language};
pub use pipeline::CleaningPipeline;
pub use quality::{QualityScore, QualityWeights};
pub use types::{CleanedRecord, CleaningContext, RawResponse};
