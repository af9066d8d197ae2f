mod app_config;
mod config;
mod diagnosis;
mod questions;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use diagnosis::{DiagnosisConfig, DiagnosisTask, TaskKey};
pub use questions::{render_question, QuestionSet, QuestionTemplate};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read questions file {path}: {source}")]
    QuestionsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse questions file: {0}")]
    QuestionsFileParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
