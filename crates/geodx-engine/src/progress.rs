//! Thread-safe progress store consumed by the polling API.
//!
//! Counters are updated by the engine's collector; `snapshot` is called by
//! the polling layer and also performs the lazy timeout check, so an
//! execution nobody is driving still flips to timed-out on read.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::state::DiagnosisState;

/// Suggested poll interval schedule: early polls are frequent, later polls
/// back off to reduce load.
const POLL_SCHEDULE: &[(u32, u64)] = &[(5, 2_000), (15, 3_000), (30, 5_000)];
const MAX_POLL_INTERVAL_MS: u64 = 10_000;

#[derive(Debug)]
struct ProgressEntry {
    completed: u32,
    total: u32,
    stage: DiagnosisState,
    poll_count: u32,
    started_at: Instant,
    deadline: Duration,
    timed_out: bool,
}

/// One read of an execution's progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub percent: u8,
    pub completed: u32,
    pub total: u32,
    pub stage: DiagnosisState,
    pub suggested_next_poll_ms: u64,
    /// Set by the lazy deadline check; the engine turns this into a
    /// `Timeout` state transition.
    pub timed_out: bool,
}

/// Per-execution progress counters keyed by execution ID.
#[derive(Default)]
pub struct ProgressTracker {
    entries: Mutex<HashMap<Uuid, ProgressEntry>>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, execution_id: Uuid, total: u32, deadline: Duration) {
        self.entries.lock().await.insert(
            execution_id,
            ProgressEntry {
                completed: 0,
                total,
                stage: DiagnosisState::Initializing,
                poll_count: 0,
                started_at: Instant::now(),
                deadline,
                timed_out: false,
            },
        );
    }

    /// Add `delta` completed tasks, saturating at `total`.
    pub async fn update(&self, execution_id: Uuid, delta: u32) {
        if let Some(entry) = self.entries.lock().await.get_mut(&execution_id) {
            entry.completed = entry.completed.saturating_add(delta).min(entry.total);
        }
    }

    pub async fn set_stage(&self, execution_id: Uuid, stage: DiagnosisState) {
        if let Some(entry) = self.entries.lock().await.get_mut(&execution_id) {
            entry.stage = stage;
        }
    }

    /// Read progress, bump the poll counter, and run the lazy timeout check.
    pub async fn snapshot(&self, execution_id: Uuid) -> Option<ProgressSnapshot> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&execution_id)?;

        entry.poll_count += 1;

        if !entry.stage.is_terminal()
            && !entry.timed_out
            && entry.started_at.elapsed() > entry.deadline
        {
            entry.timed_out = true;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let percent = if entry.total == 0 {
            100
        } else {
            (f64::from(entry.completed) / f64::from(entry.total) * 100.0).round() as u8
        };

        Some(ProgressSnapshot {
            percent,
            completed: entry.completed,
            total: entry.total,
            stage: entry.stage,
            suggested_next_poll_ms: suggested_interval(entry.poll_count),
            timed_out: entry.timed_out,
        })
    }

    pub async fn remove(&self, execution_id: Uuid) {
        self.entries.lock().await.remove(&execution_id);
    }
}

fn suggested_interval(poll_count: u32) -> u64 {
    for &(up_to, interval) in POLL_SCHEDULE {
        if poll_count <= up_to {
            return interval;
        }
    }
    MAX_POLL_INTERVAL_MS
}
