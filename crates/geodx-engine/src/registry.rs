//! Execution registry: arena + index owned by the engine.
//!
//! Every execution gets an [`ExecutionHandle`] at submission; all lookups
//! go through the registry, which is injected wherever lookup-by-ID is
//! needed. No module-level global state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use geodx_core::DiagnosisConfig;

use crate::report::ReportBuilder;
use crate::state::DiagnosisState;

/// The mutable lifecycle record of one execution.
///
/// Mutated only through [`ExecutionState::transition`] and the engine's
/// counter updates (single-writer discipline); read concurrently by the
/// polling API via cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub execution_id: Uuid,
    pub state: DiagnosisState,
    pub completed: u32,
    pub total: u32,
    pub succeeded: u32,
    pub should_stop_polling: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    #[must_use]
    pub fn new(execution_id: Uuid, total: u32) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            state: DiagnosisState::Initializing,
            completed: 0,
            total,
            succeeded: 0,
            should_stop_polling: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a state-machine transition.
    ///
    /// Invalid transitions (including any transition out of a terminal
    /// state) are logged and ignored — they never raise. Terminal
    /// transitions set `should_stop_polling`.
    pub fn transition(&mut self, to: DiagnosisState) {
        if !self.state.can_transition(to) {
            tracing::warn!(
                execution = %self.execution_id,
                from = %self.state,
                to = %to,
                "ignoring invalid state transition"
            );
            return;
        }
        tracing::info!(
            execution = %self.execution_id,
            from = %self.state,
            to = %to,
            "diagnosis state transition"
        );
        self.state = to;
        self.updated_at = Utc::now();
        if to.is_terminal() {
            self.should_stop_polling = true;
        }
    }

    /// Record one finished task. `completed` never exceeds `total`.
    pub fn record_task(&mut self, succeeded: bool) {
        if self.completed < self.total {
            self.completed += 1;
            if succeeded {
                self.succeeded += 1;
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Per-execution shared state: config, lifecycle, and the running report.
pub struct ExecutionHandle {
    pub execution_id: Uuid,
    pub config: DiagnosisConfig,
    pub started_at: Instant,
    pub state: Mutex<ExecutionState>,
    pub report: Mutex<ReportBuilder>,
}

impl ExecutionHandle {
    #[must_use]
    pub fn new(execution_id: Uuid, config: DiagnosisConfig, total_tasks: u32) -> Self {
        let report = ReportBuilder::new(execution_id, &config, total_tasks);
        Self {
            execution_id,
            config,
            started_at: Instant::now(),
            state: Mutex::new(ExecutionState::new(execution_id, total_tasks)),
            report: Mutex::new(report),
        }
    }
}

/// Lookup-by-ID index of live executions.
#[derive(Default)]
pub struct Registry {
    executions: Mutex<HashMap<Uuid, Arc<ExecutionHandle>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: Arc<ExecutionHandle>) {
        self.executions
            .lock()
            .await
            .insert(handle.execution_id, handle);
    }

    pub async fn get(&self, execution_id: Uuid) -> Option<Arc<ExecutionHandle>> {
        self.executions.lock().await.get(&execution_id).cloned()
    }

    /// Remove a finished execution from the index. The handle stays alive
    /// for any caller still holding an `Arc` to it.
    pub async fn remove(&self, execution_id: Uuid) -> Option<Arc<ExecutionHandle>> {
        self.executions.lock().await.remove(&execution_id)
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.executions.lock().await.keys().copied().collect()
    }
}
