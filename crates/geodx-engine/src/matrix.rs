//! Task-matrix expansion.

use uuid::Uuid;

use geodx_core::{render_question, DiagnosisConfig, DiagnosisTask};

/// Expand a config into its full task matrix.
///
/// For each question, for each selected model, for each brand in
/// `[main_brand] + competitor_brands`, substitute the brand into the
/// question template and create one task. Competitor brands participate in
/// the same matrix as the main brand — the brand substitution is what
/// personalizes the question — so the total is
/// `|questions| × |models| × (1 + |competitors|)`.
#[must_use]
pub fn expand_matrix(execution_id: Uuid, config: &DiagnosisConfig) -> Vec<DiagnosisTask> {
    let brands = config.all_brands();
    let mut tasks = Vec::with_capacity(config.task_count());

    for (question_index, template) in config.questions.iter().enumerate() {
        for model in &config.selected_models {
            for brand in &brands {
                tasks.push(DiagnosisTask {
                    task_id: Uuid::new_v4(),
                    execution_id,
                    question_index,
                    question: render_question(template, brand),
                    model: model.clone(),
                    brand: brand.clone(),
                    is_main_brand: *brand == config.main_brand,
                });
            }
        }
    }

    tasks
}
