use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use geodx_engine::{DeadLetterEntry, DeadLetterFilter, DeadLetterStatus};

use crate::middleware::RequestId;

use super::{map_engine_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct DeadLetterQuery {
    pub execution_id: Option<Uuid>,
    pub status: Option<DeadLetterStatus>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResolveRequest {
    pub handled_by: String,
    pub notes: Option<String>,
}

pub(super) async fn list_dead_letters(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<DeadLetterQuery>,
) -> Json<ApiResponse<Vec<DeadLetterEntry>>> {
    let entries = state
        .engine
        .dead_letters()
        .list(DeadLetterFilter {
            execution_id: query.execution_id,
            status: query.status,
        })
        .await;

    Json(ApiResponse {
        data: entries,
        meta: ResponseMeta::new(req_id.0),
    })
}

pub(super) async fn resolve_dead_letter(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .engine
        .dead_letters()
        .mark_resolved(id, &body.handled_by, body.notes.as_deref())
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "resolved": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn retry_dead_letter(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DeadLetterEntry>>, ApiError> {
    let entry = state
        .engine
        .dead_letters()
        .mark_for_retry(id)
        .await
        .map_err(|e| map_engine_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: entry,
        meta: ResponseMeta::new(req_id.0),
    }))
}
