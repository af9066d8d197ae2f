//! Question template loading and brand substitution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const BRAND_PLACEHOLDER: &str = "{brandName}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub text: String,
    /// Optional grouping label, e.g. `awareness` or `comparison`.
    pub category: Option<String>,
}

/// The default question templates offered to clients that submit a diagnosis
/// without their own questions.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<QuestionTemplate>,
}

impl QuestionSet {
    /// Load and validate question templates from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read, parsed, or fails
    /// validation (empty set, empty template, template without placeholder).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::QuestionsFileIo {
            path: path.display().to_string(),
            source: e,
        })?;

        let set: QuestionSet = serde_yaml::from_str(&content)?;
        set.validate()?;
        Ok(set)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.questions.is_empty() {
            return Err(ConfigError::Validation(
                "questions file must contain at least one template".to_string(),
            ));
        }
        for template in &self.questions {
            if template.text.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "question template must be non-empty".to_string(),
                ));
            }
            if !template.text.contains(BRAND_PLACEHOLDER) {
                return Err(ConfigError::Validation(format!(
                    "question template '{}' is missing the {BRAND_PLACEHOLDER} placeholder",
                    template.text
                )));
            }
        }
        Ok(())
    }

    /// Template texts only, for building a [`crate::DiagnosisConfig`].
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.questions.iter().map(|q| q.text.clone()).collect()
    }
}

/// Substitute the brand name into a question template.
///
/// Templates without the placeholder are returned unchanged — callers may
/// submit fully-written questions.
#[must_use]
pub fn render_question(template: &str, brand: &str) -> String {
    template.replace(BRAND_PLACEHOLDER, brand)
}
