//! Persistence gateway seam.
//!
//! The engine checkpoints through this trait and treats every failure as
//! transient: checkpoints are logged and skipped, never allowed to abort an
//! execution. The in-memory state stays authoritative until a write lands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dead_letter::DeadLetterEntry;
use crate::registry::ExecutionState;
use crate::report::AggregatedReport;

#[derive(Debug, Error)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

/// Durable store for execution state, report snapshots, and dead letters.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Write a whole-row snapshot of the current state and partial report.
    /// Append-then-flip: one upsert, never a partial in-place update.
    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError>;

    async fn save_final_report(
        &self,
        execution_id: Uuid,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError>;

    async fn load_state(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<ExecutionState>, PersistenceError>;

    async fn append_dead_letter(&self, entry: &DeadLetterEntry) -> Result<(), PersistenceError>;
}

/// In-memory gateway for tests and single-process deployments.
///
/// `fail_checkpoints` injects transient checkpoint failures so tests can
/// prove the engine keeps running through them.
#[derive(Default)]
pub struct MemoryGateway {
    states: Mutex<HashMap<Uuid, ExecutionState>>,
    reports: Mutex<HashMap<Uuid, AggregatedReport>>,
    dead_letters: Mutex<Vec<DeadLetterEntry>>,
    fail_checkpoints: AtomicBool,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_checkpoints(&self, fail: bool) {
        self.fail_checkpoints.store(fail, Ordering::SeqCst);
    }

    pub async fn report(&self, execution_id: Uuid) -> Option<AggregatedReport> {
        self.reports.lock().await.get(&execution_id).cloned()
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().await.len()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        state: &ExecutionState,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(PersistenceError("injected checkpoint failure".to_owned()));
        }
        self.states.lock().await.insert(execution_id, state.clone());
        self.reports
            .lock()
            .await
            .insert(execution_id, report.clone());
        Ok(())
    }

    async fn save_final_report(
        &self,
        execution_id: Uuid,
        report: &AggregatedReport,
    ) -> Result<(), PersistenceError> {
        self.reports
            .lock()
            .await
            .insert(execution_id, report.clone());
        Ok(())
    }

    async fn load_state(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<ExecutionState>, PersistenceError> {
        Ok(self.states.lock().await.get(&execution_id).cloned())
    }

    async fn append_dead_letter(&self, entry: &DeadLetterEntry) -> Result<(), PersistenceError> {
        self.dead_letters.lock().await.push(entry.clone());
        Ok(())
    }
}
