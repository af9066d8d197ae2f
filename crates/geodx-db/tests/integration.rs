//! Gateway integration tests. Require a Postgres instance; `sqlx::test`
//! provisions a fresh database per test and applies the migrations.

use sqlx::PgPool;
use uuid::Uuid;

use geodx_core::{DiagnosisConfig, DiagnosisTask};
use geodx_db::PgGateway;
use geodx_engine::{
    DeadLetterEntry, DiagnosisState, ExecutionState, PersistenceGateway, ReportBuilder,
};

fn config() -> DiagnosisConfig {
    DiagnosisConfig {
        main_brand: "Acme Water".to_string(),
        competitor_brands: vec!["Blue Peak".to_string()],
        questions: vec!["What do you know about {brandName}?".to_string()],
        selected_models: vec!["gpt-4o-mini".to_string()],
        user_id: "user-1".to_string(),
    }
}

fn task(execution_id: Uuid) -> DiagnosisTask {
    DiagnosisTask {
        task_id: Uuid::new_v4(),
        execution_id,
        question_index: 0,
        question: "What do you know about Acme Water?".to_string(),
        model: "gpt-4o-mini".to_string(),
        brand: "Acme Water".to_string(),
        is_main_brand: true,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkpoint_upserts_and_loads_back(pool: PgPool) {
    let gateway = PgGateway::new(pool);
    let execution_id = Uuid::new_v4();

    let mut state = ExecutionState::new(execution_id, 2);
    state.transition(DiagnosisState::AiFetching);
    let report = ReportBuilder::new(execution_id, &config(), 2).build(state.state);

    gateway
        .save_checkpoint(execution_id, &state, &report)
        .await
        .expect("first checkpoint");

    // Second checkpoint updates the same row in place.
    state.record_task(true);
    gateway
        .save_checkpoint(execution_id, &state, &report)
        .await
        .expect("second checkpoint");

    let loaded = gateway
        .load_state(execution_id)
        .await
        .expect("load")
        .expect("state row");
    assert_eq!(loaded.execution_id, execution_id);
    assert_eq!(loaded.state, DiagnosisState::AiFetching);
    assert_eq!(loaded.completed, 1);
    assert_eq!(loaded.total, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn final_report_requires_a_checkpoint_row(pool: PgPool) {
    let gateway = PgGateway::new(pool);
    let execution_id = Uuid::new_v4();
    let report = ReportBuilder::new(execution_id, &config(), 1).build(DiagnosisState::Completed);

    let err = gateway
        .save_final_report(execution_id, &report)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn dead_letter_append_is_idempotent_per_entry(pool: PgPool) {
    let gateway = PgGateway::new(pool.clone());
    let execution_id = Uuid::new_v4();
    let entry = DeadLetterEntry::new(
        task(execution_id),
        "rate limited by openai",
        serde_json::json!({ "model": "gpt-4o-mini" }),
    );

    gateway.append_dead_letter(&entry).await.expect("append");
    gateway.append_dead_letter(&entry).await.expect("re-append");

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM dead_letters WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_one(&pool)
            .await
            .expect("count");
    assert_eq!(count, 1, "same entry ID must upsert, not duplicate");
}

#[sqlx::test(migrations = "../../migrations")]
async fn load_state_of_unknown_execution_is_none(pool: PgPool) {
    let gateway = PgGateway::new(pool);
    let loaded = gateway.load_state(Uuid::new_v4()).await.expect("load");
    assert!(loaded.is_none());
}
