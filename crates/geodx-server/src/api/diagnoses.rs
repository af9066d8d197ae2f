use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use geodx_core::DiagnosisConfig;
use geodx_engine::{AggregatedReport, StatusSnapshot};

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SubmitRequest {
    pub main_brand: String,
    #[serde(default)]
    pub competitor_brands: Vec<String>,
    /// Question templates; the server's defaults are used when omitted.
    #[serde(default)]
    pub questions: Vec<String>,
    pub selected_models: Vec<String>,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SubmitResponse {
    pub execution_id: Uuid,
    pub total_tasks: usize,
}

pub(super) async fn submit_diagnosis(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmitResponse>>), ApiError> {
    let questions = if body.questions.is_empty() {
        state.default_questions.as_ref().clone()
    } else {
        body.questions
    };

    let config = DiagnosisConfig {
        main_brand: body.main_brand,
        competitor_brands: body.competitor_brands,
        questions,
        selected_models: body.selected_models,
        user_id: body.user_id,
    };
    let total_tasks = config.task_count();

    let execution_id = state
        .engine
        .submit(config)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: SubmitResponse {
                execution_id,
                total_tasks,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn get_diagnosis_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<StatusSnapshot>>, ApiError> {
    let snapshot = state
        .engine
        .status(id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: snapshot,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn get_diagnosis_report(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AggregatedReport>>, ApiError> {
    let report = state
        .engine
        .report(id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: report,
        meta: ResponseMeta::new(req_id.0),
    }))
}
