//! Dead letter queue for tasks that exhausted their retries.
//!
//! Entries are terminal until an operator marks them resolved or queues
//! them for replay. Higher priority sorts first so triage tooling surfaces
//! main-brand failures before competitor ones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use geodx_core::DiagnosisTask;

use crate::EngineError;

pub const PRIORITY_MAIN_BRAND: u8 = 2;
pub const PRIORITY_COMPETITOR: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterStatus {
    Pending,
    Resolved,
    Retrying,
}

/// A task plus its final error and context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub task: DiagnosisTask,
    pub error: String,
    pub context: serde_json::Value,
    pub priority: u8,
    pub status: DeadLetterStatus,
    pub retry_count: u32,
    pub handled_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    #[must_use]
    pub fn new(task: DiagnosisTask, error: &str, context: serde_json::Value) -> Self {
        let now = Utc::now();
        let priority = if task.is_main_brand {
            PRIORITY_MAIN_BRAND
        } else {
            PRIORITY_COMPETITOR
        };
        Self {
            id: Uuid::new_v4(),
            execution_id: task.execution_id,
            task,
            error: error.to_owned(),
            context,
            priority,
            status: DeadLetterStatus::Pending,
            retry_count: 0,
            handled_by: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter for listing entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadLetterFilter {
    pub execution_id: Option<Uuid>,
    pub status: Option<DeadLetterStatus>,
}

/// In-memory dead letter store; durable persistence happens through the
/// gateway append the engine performs alongside [`DeadLetterQueue::add`].
#[derive(Default)]
pub struct DeadLetterQueue {
    entries: Mutex<HashMap<Uuid, DeadLetterEntry>>,
}

impl DeadLetterQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, entry: DeadLetterEntry) {
        tracing::warn!(
            execution = %entry.execution_id,
            task = %entry.task.key(),
            priority = entry.priority,
            error = %entry.error,
            "task dead-lettered after exhausting retries"
        );
        self.entries.lock().await.insert(entry.id, entry);
    }

    /// Entries matching `filter`, highest priority first, then oldest first.
    pub async fn list(&self, filter: DeadLetterFilter) -> Vec<DeadLetterEntry> {
        let entries = self.entries.lock().await;
        let mut matched: Vec<DeadLetterEntry> = entries
            .values()
            .filter(|e| {
                filter
                    .execution_id
                    .is_none_or(|id| e.execution_id == id)
                    && filter.status.is_none_or(|s| e.status == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        matched
    }

    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDeadLetter`] if no entry has `id`.
    pub async fn mark_resolved(
        &self,
        id: Uuid,
        handled_by: &str,
        notes: Option<&str>,
    ) -> Result<(), EngineError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&id)
            .ok_or(EngineError::UnknownDeadLetter(id))?;
        entry.status = DeadLetterStatus::Resolved;
        entry.handled_by = Some(handled_by.to_owned());
        entry.notes = notes.map(ToOwned::to_owned);
        entry.updated_at = Utc::now();
        Ok(())
    }

    /// Queue an entry for replay: bumps `retry_count` and resets it to
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownDeadLetter`] if no entry has `id`.
    pub async fn mark_for_retry(&self, id: Uuid) -> Result<DeadLetterEntry, EngineError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(&id)
            .ok_or(EngineError::UnknownDeadLetter(id))?;
        entry.retry_count += 1;
        entry.status = DeadLetterStatus::Pending;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}
