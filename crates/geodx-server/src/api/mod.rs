mod dead_letters;
mod diagnoses;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use geodx_engine::{DiagnosisEngine, EngineError};

use crate::middleware::{request_id, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub engine: DiagnosisEngine,
    /// Absent when the server runs against the in-memory gateway.
    pub pool: Option<PgPool>,
    /// Question templates used when a submission omits its own questions.
    pub default_questions: Arc<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    match error {
        EngineError::Validation(message) => {
            ApiError::new(request_id, "validation_error", message.clone())
        }
        EngineError::UnknownExecution(id) => ApiError::new(
            request_id,
            "not_found",
            format!("no diagnosis execution with id {id}"),
        ),
        EngineError::UnknownDeadLetter(id) => ApiError::new(
            request_id,
            "not_found",
            format!("no dead letter entry with id {id}"),
        ),
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/diagnoses", post(diagnoses::submit_diagnosis))
        .route(
            "/api/v1/diagnoses/{id}/status",
            get(diagnoses::get_diagnosis_status),
        )
        .route(
            "/api/v1/diagnoses/{id}/report",
            get(diagnoses::get_diagnosis_report),
        )
        .route("/api/v1/dead-letters", get(dead_letters::list_dead_letters))
        .route(
            "/api/v1/dead-letters/{id}/resolve",
            post(dead_letters::resolve_dead_letter),
        )
        .route(
            "/api/v1/dead-letters/{id}/retry",
            post(dead_letters::retry_dead_letter),
        )
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "not_configured",
                },
                meta,
            }),
        );
    };

    match geodx_db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use geodx_adapters::{AdapterRegistry, MockAdapter, RetryPolicy};
    use geodx_engine::{EngineConfig, MemoryGateway};

    fn test_state(content: &str) -> AppState {
        let mut adapters = AdapterRegistry::new();
        adapters.register(Arc::new(MockAdapter::succeeding("openai", content)));
        let engine = DiagnosisEngine::new(
            adapters,
            Arc::new(MemoryGateway::new()),
            EngineConfig {
                worker_concurrency: 2,
                retry: RetryPolicy {
                    max_attempts: 2,
                    base_delay_ms: 0,
                    max_delay_ms: 0,
                    jitter: false,
                },
                execution_timeout: Duration::from_secs(10),
                adapter_timeout: Duration::from_secs(5),
                checkpoint_every: 1,
            },
        );
        AppState {
            engine,
            pool: None,
            default_questions: Arc::new(vec![
                "What do you know about {brandName}?".to_string(),
            ]),
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    #[tokio::test]
    async fn health_reports_ok_without_database() {
        let app = build_app(test_state("ok"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["database"].as_str(), Some("not_configured"));
        assert!(json["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn submit_then_poll_until_completed() {
        let app = build_app(test_state("Acme Water is a trusted brand."));

        let submit = Request::builder()
            .method("POST")
            .uri("/api/v1/diagnoses")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "main_brand": "Acme Water",
                    "competitor_brands": [],
                    "selected_models": ["gpt-4o-mini"],
                    "user_id": "user-1"
                })
                .to_string(),
            ))
            .expect("request");

        let response = app.clone().oneshot(submit).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        let id = json["data"]["execution_id"].as_str().expect("id").to_owned();

        // Poll the status contract until the engine says to stop.
        let mut last = serde_json::Value::Null;
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/v1/diagnoses/{id}/status"))
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
            last = body_json(response).await;
            if last["data"]["should_stop_polling"].as_bool() == Some(true) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(last["data"]["status"].as_str(), Some("completed"));
        assert!(last["data"]["suggested_next_poll_ms"].as_u64().is_some());

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/diagnoses/{id}/report"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["data"]["is_stub"].as_bool(), Some(false));
        assert_eq!(report["data"]["data_completeness"].as_f64(), Some(100.0));
    }

    #[tokio::test]
    async fn submit_without_questions_uses_defaults() {
        let app = build_app(test_state("Acme Water is fine."));

        let submit = Request::builder()
            .method("POST")
            .uri("/api/v1/diagnoses")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "main_brand": "Acme Water",
                    "selected_models": ["gpt-4o-mini"],
                    "user_id": "user-1"
                })
                .to_string(),
            ))
            .expect("request");

        let response = app.oneshot(submit).await.expect("response");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn invalid_submission_is_a_400() {
        let app = build_app(test_state("ok"));

        let submit = Request::builder()
            .method("POST")
            .uri("/api/v1/diagnoses")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "main_brand": "",
                    "selected_models": ["gpt-4o-mini"],
                    "user_id": "user-1"
                })
                .to_string(),
            ))
            .expect("request");

        let response = app.oneshot(submit).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"].as_str(), Some("validation_error"));
    }

    #[tokio::test]
    async fn unknown_execution_is_a_404() {
        let app = build_app(test_state("ok"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/diagnoses/{}/status", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dead_letters_endpoint_returns_empty_list() {
        let app = build_app(test_state("ok"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/dead-letters")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
