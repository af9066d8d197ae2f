//! Postgres implementation of the engine's persistence gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use geodx_engine::{
    AggregatedReport, DeadLetterEntry, DeadLetterStatus, DiagnosisState, ExecutionState,
    PersistenceError, PersistenceGateway,
};

use crate::DbError;

/// A row from the `diagnosis_executions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ExecutionRow {
    pub public_id: Uuid,
    pub status: String,
    pub completed: i32,
    pub total: i32,
    pub succeeded: i32,
    pub should_stop_polling: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionRow {
    fn into_state(self) -> Result<ExecutionState, DbError> {
        let state: DiagnosisState = self
            .status
            .parse()
            .map_err(|_| DbError::NotFound)?;
        Ok(ExecutionState {
            execution_id: self.public_id,
            state,
            completed: u32::try_from(self.completed).unwrap_or(0),
            total: u32::try_from(self.total).unwrap_or(0),
            succeeded: u32::try_from(self.succeeded).unwrap_or(0),
            should_stop_polling: self.should_stop_polling,
            error: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn status_str(status: DeadLetterStatus) -> &'static str {
    match status {
        DeadLetterStatus::Pending => "pending",
        DeadLetterStatus::Resolved => "resolved",
        DeadLetterStatus::Retrying => "retrying",
    }
}

/// [`PersistenceGateway`] over a Postgres pool.
///
/// Checkpoints are single-statement whole-row upserts keyed by the
/// execution's public ID, so a crash mid-write never leaves a torn
/// snapshot.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_checkpoint(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
        report: &AggregatedReport,
    ) -> Result<(), DbError> {
        let report_json = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO diagnosis_executions \
                 (public_id, status, completed, total, succeeded, \
                  should_stop_polling, error_message, report, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) \
             ON CONFLICT (public_id) DO UPDATE SET \
                 status              = EXCLUDED.status, \
                 completed           = EXCLUDED.completed, \
                 total               = EXCLUDED.total, \
                 succeeded           = EXCLUDED.succeeded, \
                 should_stop_polling = EXCLUDED.should_stop_polling, \
                 error_message       = EXCLUDED.error_message, \
                 report              = EXCLUDED.report, \
                 updated_at          = NOW()",
        )
        .bind(execution_id)
        .bind(state.state.to_string())
        .bind(i32::try_from(state.completed).unwrap_or(i32::MAX))
        .bind(i32::try_from(state.total).unwrap_or(i32::MAX))
        .bind(i32::try_from(state.succeeded).unwrap_or(i32::MAX))
        .bind(state.should_stop_polling)
        .bind(state.error.as_deref())
        .bind(report_json)
        .bind(state.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_final_report(
        &self,
        execution_id: Uuid,
        report: &AggregatedReport,
    ) -> Result<(), DbError> {
        let report_json = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
        let result = sqlx::query(
            "UPDATE diagnosis_executions \
             SET report = $1, updated_at = NOW() \
             WHERE public_id = $2",
        )
        .bind(report_json)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    async fn fetch_state(&self, execution_id: Uuid) -> Result<Option<ExecutionState>, DbError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT public_id, status, completed, total, succeeded, \
                    should_stop_polling, error_message, created_at, updated_at \
             FROM diagnosis_executions \
             WHERE public_id = $1",
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExecutionRow::into_state).transpose()
    }

    async fn insert_dead_letter(&self, entry: &DeadLetterEntry) -> Result<(), DbError> {
        let task_json = serde_json::to_value(&entry.task).unwrap_or(serde_json::Value::Null);
        sqlx::query(
            "INSERT INTO dead_letters \
                 (public_id, execution_id, task, error_message, context, \
                  priority, status, retry_count, handled_by, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (public_id) DO UPDATE SET \
                 status      = EXCLUDED.status, \
                 retry_count = EXCLUDED.retry_count, \
                 handled_by  = EXCLUDED.handled_by, \
                 notes       = EXCLUDED.notes, \
                 updated_at  = NOW()",
        )
        .bind(entry.id)
        .bind(entry.execution_id)
        .bind(task_json)
        .bind(&entry.error)
        .bind(&entry.context)
        .bind(i16::from(entry.priority))
        .bind(status_str(entry.status))
        .bind(i32::try_from(entry.retry_count).unwrap_or(i32::MAX))
        .bind(entry.handled_by.as_deref())
        .bind(entry.notes.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for PgGateway {
    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError> {
        self.upsert_checkpoint(execution_id, state, report)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }

    async fn save_final_report(
        &self,
        execution_id: Uuid,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError> {
        self.update_final_report(execution_id, report)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }

    async fn load_state(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<ExecutionState>, PersistenceError> {
        self.fetch_state(execution_id)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }

    async fn append_dead_letter(&self, entry: &DeadLetterEntry) -> Result<(), PersistenceError> {
        self.insert_dead_letter(entry)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }
}
