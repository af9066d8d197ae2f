//! Domain types for one diagnosis execution.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ConfigError;

/// Immutable input for one diagnosis job.
///
/// Created once at submission and never mutated. The task matrix is derived
/// deterministically from this config: one task per
/// `question × model × brand`, where brands = `[main_brand] + competitor_brands`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisConfig {
    pub main_brand: String,
    #[serde(default)]
    pub competitor_brands: Vec<String>,
    /// Question templates; `{brandName}` is substituted per task.
    pub questions: Vec<String>,
    pub selected_models: Vec<String>,
    pub user_id: String,
}

impl DiagnosisConfig {
    /// Synchronous submission-time validation. All AI calls happen after this.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the main brand is empty, no
    /// model is selected, or no question is provided.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main_brand.trim().is_empty() {
            return Err(ConfigError::Validation(
                "main brand must be non-empty".to_string(),
            ));
        }
        if self.selected_models.is_empty() {
            return Err(ConfigError::Validation(
                "at least one model must be selected".to_string(),
            ));
        }
        if self.questions.is_empty() {
            return Err(ConfigError::Validation(
                "at least one question is required".to_string(),
            ));
        }
        Ok(())
    }

    /// All brands participating in the task matrix, main brand first.
    #[must_use]
    pub fn all_brands(&self) -> Vec<String> {
        let mut brands = Vec::with_capacity(1 + self.competitor_brands.len());
        brands.push(self.main_brand.clone());
        brands.extend(self.competitor_brands.iter().cloned());
        brands
    }

    /// Total task count for this config: `|questions| × |models| × |brands|`.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.questions.len() * self.selected_models.len() * (1 + self.competitor_brands.len())
    }
}

/// Uniqueness key for one cleaned record within an execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub question_index: usize,
    pub model: String,
    pub brand: String,
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "q{}/{}/{}", self.question_index, self.model, self.brand)
    }
}

/// One `(question, model, brand)` cell of the task matrix.
///
/// Immutable once created; owned by the engine until dispatched to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisTask {
    pub task_id: Uuid,
    pub execution_id: Uuid,
    pub question_index: usize,
    /// The question with the brand name already substituted.
    pub question: String,
    pub model: String,
    pub brand: String,
    pub is_main_brand: bool,
}

impl DiagnosisTask {
    #[must_use]
    pub fn key(&self) -> TaskKey {
        TaskKey {
            question_index: self.question_index,
            model: self.model.clone(),
            brand: self.brand.clone(),
        }
    }
}
