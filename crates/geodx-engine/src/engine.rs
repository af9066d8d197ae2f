//! The diagnosis engine: submission, dispatch, collection, and polling.
//!
//! One control loop runs per execution. Workers call adapters under the
//! retry policy with bounded concurrency and send their outcomes over a
//! channel to a single collector task, which cleans, aggregates, updates
//! progress, and checkpoints — aggregation stays single-writer without
//! fine-grained locks. The global timeout is enforced actively around the
//! fetch phase and passively by the progress tracker's lazy check.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use geodx_adapters::{retry_send, AdapterError, AdapterRegistry, ChatResponse, RetryPolicy};
use geodx_cleaning::{CleanedRecord, CleaningContext, CleaningPipeline, DedupIndex, RawResponse};
use geodx_core::{AppConfig, DiagnosisConfig, DiagnosisTask};

use crate::dead_letter::{DeadLetterEntry, DeadLetterQueue};
use crate::matrix::expand_matrix;
use crate::persist::PersistenceGateway;
use crate::progress::ProgressTracker;
use crate::registry::{ExecutionHandle, ExecutionState, Registry};
use crate::report::AggregatedReport;
use crate::state::DiagnosisState;
use crate::EngineError;

/// Engine tunables, normally derived from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Bounded worker pool size per execution.
    pub worker_concurrency: usize,
    pub retry: RetryPolicy,
    pub execution_timeout: Duration,
    /// Per-attempt adapter call timeout.
    pub adapter_timeout: Duration,
    /// Checkpoint after every N collected results. 0 disables periodic
    /// checkpoints (the final one still runs).
    pub checkpoint_every: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 6,
            retry: RetryPolicy::default(),
            execution_timeout: Duration::from_secs(1_800),
            adapter_timeout: Duration::from_secs(60),
            checkpoint_every: 5,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            worker_concurrency: config.worker_concurrency,
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay_ms: config.retry_base_ms,
                max_delay_ms: config.retry_max_delay_ms,
                jitter: true,
            },
            execution_timeout: Duration::from_secs(config.execution_timeout_secs),
            adapter_timeout: Duration::from_secs(config.adapter_timeout_secs),
            checkpoint_every: config.checkpoint_every,
        }
    }
}

/// One polling-API read of an execution.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub execution_id: Uuid,
    pub status: DiagnosisState,
    pub stage: String,
    pub progress_percent: u8,
    pub completed: u32,
    pub total: u32,
    pub should_stop_polling: bool,
    pub suggested_next_poll_ms: u64,
    pub error: Option<String>,
}

struct TaskOutcome {
    task: DiagnosisTask,
    result: Result<ChatResponse, AdapterError>,
}

/// Orchestrator for diagnosis executions.
#[derive(Clone)]
pub struct DiagnosisEngine {
    registry: Arc<Registry>,
    adapters: Arc<AdapterRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
    dead_letters: Arc<DeadLetterQueue>,
    progress: Arc<ProgressTracker>,
    config: EngineConfig,
}

impl DiagnosisEngine {
    #[must_use]
    pub fn new(
        adapters: AdapterRegistry,
        gateway: Arc<dyn PersistenceGateway>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            adapters: Arc::new(adapters),
            gateway,
            dead_letters: Arc::new(DeadLetterQueue::new()),
            progress: Arc::new(ProgressTracker::new()),
            config,
        }
    }

    #[must_use]
    pub fn dead_letters(&self) -> &DeadLetterQueue {
        &self.dead_letters
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Submit a diagnosis job. Validation is synchronous; every AI call
    /// happens asynchronously after this returns.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a malformed config.
    pub async fn submit(&self, config: DiagnosisConfig) -> Result<Uuid, EngineError> {
        config.validate()?;

        let execution_id = Uuid::new_v4();
        let tasks = expand_matrix(execution_id, &config);
        let total = u32::try_from(tasks.len()).unwrap_or(u32::MAX);

        let handle = Arc::new(ExecutionHandle::new(execution_id, config, total));
        self.registry.insert(Arc::clone(&handle)).await;
        self.progress
            .create(execution_id, total, self.config.execution_timeout)
            .await;

        tracing::info!(
            execution = %execution_id,
            tasks = total,
            "diagnosis submitted"
        );

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(handle, tasks).await;
        });

        Ok(execution_id)
    }

    /// Polling contract. Never returns "not found" for an execution that
    /// was successfully submitted: live executions come from the registry,
    /// finished ones from the persistence gateway after a restart.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownExecution`] only for IDs that were
    /// never submitted.
    pub async fn status(&self, execution_id: Uuid) -> Result<StatusSnapshot, EngineError> {
        let Some(handle) = self.registry.get(execution_id).await else {
            return self.status_from_gateway(execution_id).await;
        };

        let progress = self.progress.snapshot(execution_id).await;

        // Lazy timeout: the tracker flags an over-deadline execution on
        // read; the state machine transition happens here, under the
        // engine's single-writer discipline.
        if progress.as_ref().is_some_and(|p| p.timed_out) {
            let mut state = handle.state.lock().await;
            if !state.state.is_terminal() {
                state.transition(DiagnosisState::Timeout);
                state.error = Some("execution timed out".to_owned());
            }
        }

        let state = handle.state.lock().await.clone();
        if state.state.is_terminal() {
            self.progress.set_stage(execution_id, state.state).await;
        }

        let (progress_percent, suggested_next_poll_ms) = progress
            .map_or((percent_of(&state), 2_000), |p| {
                (p.percent, p.suggested_next_poll_ms)
            });

        Ok(StatusSnapshot {
            execution_id,
            status: state.state,
            stage: state.state.to_string(),
            progress_percent,
            completed: state.completed,
            total: state.total,
            should_stop_polling: state.should_stop_polling,
            suggested_next_poll_ms,
            error: state.error,
        })
    }

    /// The current report — a stub while the execution is still running.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownExecution`] if no live execution has
    /// this ID.
    pub async fn report(&self, execution_id: Uuid) -> Result<AggregatedReport, EngineError> {
        let handle = self
            .registry
            .get(execution_id)
            .await
            .ok_or(EngineError::UnknownExecution(execution_id))?;
        let state = handle.state.lock().await.clone();
        let report = handle.report.lock().await.build(state.state);
        Ok(report)
    }

    /// Drop a finished execution from the registry and progress tracker.
    pub async fn cleanup(&self, execution_id: Uuid) {
        self.registry.remove(execution_id).await;
        self.progress.remove(execution_id).await;
    }

    /// Sweep every live execution through the lazy timeout check. Called
    /// by the background scheduler so executions nobody polls still time
    /// out. Returns the number of executions newly flipped to `Timeout`.
    pub async fn sweep_stale(&self) -> usize {
        let mut swept = 0;
        for execution_id in self.registry.ids().await {
            let Some(handle) = self.registry.get(execution_id).await else {
                continue;
            };
            if handle.state.lock().await.state.is_terminal() {
                continue;
            }
            if let Ok(snapshot) = self.status(execution_id).await {
                if snapshot.status == DiagnosisState::Timeout {
                    swept += 1;
                }
            }
        }
        swept
    }

    async fn status_from_gateway(
        &self,
        execution_id: Uuid,
    ) -> Result<StatusSnapshot, EngineError> {
        match self.gateway.load_state(execution_id).await {
            Ok(Some(state)) => Ok(StatusSnapshot {
                execution_id,
                status: state.state,
                stage: state.state.to_string(),
                progress_percent: percent_of(&state),
                completed: state.completed,
                total: state.total,
                should_stop_polling: state.should_stop_polling,
                suggested_next_poll_ms: 2_000,
                error: state.error,
            }),
            Ok(None) => Err(EngineError::UnknownExecution(execution_id)),
            Err(e) => {
                tracing::error!(execution = %execution_id, error = %e, "state load failed");
                Err(EngineError::UnknownExecution(execution_id))
            }
        }
    }

    /// Control loop for one execution.
    async fn run(self, handle: Arc<ExecutionHandle>, tasks: Vec<DiagnosisTask>) {
        let execution_id = handle.execution_id;

        {
            let mut state = handle.state.lock().await;
            state.transition(DiagnosisState::AiFetching);
        }
        self.progress
            .set_stage(execution_id, DiagnosisState::AiFetching)
            .await;
        self.checkpoint(&handle).await;

        let (tx, rx) = mpsc::channel::<TaskOutcome>(self.config.worker_concurrency.max(1) * 2);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let fetch_task = tokio::spawn(Self::fetch_all(
            Arc::clone(&self.adapters),
            self.config,
            tasks,
            tx,
            cancel_rx,
        ));

        let mut collect_task = tokio::spawn(self.clone().collect(Arc::clone(&handle), rx));

        let timed_out = tokio::time::timeout(self.config.execution_timeout, &mut collect_task)
            .await
            .is_err();

        if timed_out {
            // Signal in-flight workers to abandon work, then let the
            // collector drain whatever already arrived.
            let _ = cancel_tx.send(true);
            fetch_task.abort();
            let _ = collect_task.await;
            tracing::warn!(execution = %execution_id, "execution timed out");

            {
                let mut state = handle.state.lock().await;
                state.error = Some("execution timed out".to_owned());
                state.transition(DiagnosisState::Timeout);
            }
            self.progress
                .set_stage(execution_id, DiagnosisState::Timeout)
                .await;
            self.finalize(&handle).await;
            return;
        }

        {
            let mut state = handle.state.lock().await;
            state.transition(DiagnosisState::Analyzing);
        }
        self.progress
            .set_stage(execution_id, DiagnosisState::Analyzing)
            .await;

        let terminal = {
            let state = handle.state.lock().await;
            if state.succeeded == 0 {
                DiagnosisState::Failed
            } else if state.succeeded == state.total {
                DiagnosisState::Completed
            } else {
                DiagnosisState::PartialCompleted
            }
        };

        {
            let mut state = handle.state.lock().await;
            if terminal == DiagnosisState::Failed {
                state.error = Some("all tasks failed".to_owned());
            }
            state.transition(terminal);
        }
        self.progress.set_stage(execution_id, terminal).await;
        self.finalize(&handle).await;

        tracing::info!(execution = %execution_id, state = %terminal, "diagnosis finished");
    }

    /// Dispatch every task onto the bounded worker pool.
    async fn fetch_all(
        adapters: Arc<AdapterRegistry>,
        config: EngineConfig,
        tasks: Vec<DiagnosisTask>,
        tx: mpsc::Sender<TaskOutcome>,
        cancel: watch::Receiver<bool>,
    ) {
        futures::stream::iter(tasks)
            .for_each_concurrent(config.worker_concurrency, |task| {
                let adapters = Arc::clone(&adapters);
                let tx = tx.clone();
                let mut cancel = cancel.clone();
                async move {
                    let result = tokio::select! {
                        _ = cancel.wait_for(|c| *c) => return,
                        result = call_adapter(&adapters, &config, &task) => result,
                    };
                    // A closed channel means the collector is gone; the
                    // execution is already being finalized.
                    let _ = tx.send(TaskOutcome { task, result }).await;
                }
            })
            .await;
    }

    /// Single collector: cleans, aggregates, updates progress, checkpoints.
    async fn collect(self, handle: Arc<ExecutionHandle>, mut rx: mpsc::Receiver<TaskOutcome>) {
        let pipeline = CleaningPipeline::new();
        let ctx = CleaningContext::new(
            &handle.config.main_brand,
            &handle.config.competitor_brands,
        );
        let mut dedup = DedupIndex::default();
        let mut processed: u32 = 0;

        while let Some(TaskOutcome { task, result }) = rx.recv().await {
            let record = match result {
                Ok(response) => pipeline.clean(
                    &RawResponse {
                        task,
                        content: response.content,
                        latency_ms: response.latency_ms,
                        tokens_used: response.tokens_used,
                    },
                    &ctx,
                    &mut dedup,
                ),
                Err(err) => {
                    let entry = DeadLetterEntry::new(
                        task.clone(),
                        &err.to_string(),
                        serde_json::json!({
                            "model": task.model,
                            "brand": task.brand,
                            "question_index": task.question_index,
                        }),
                    );
                    if let Err(e) = self.gateway.append_dead_letter(&entry).await {
                        tracing::error!(
                            execution = %handle.execution_id,
                            error = %e,
                            "failed to persist dead letter"
                        );
                    }
                    self.dead_letters.add(entry).await;
                    CleanedRecord::failed_placeholder(&task, &err.to_string())
                }
            };

            let succeeded = !record.failed;
            {
                let mut report = handle.report.lock().await;
                report.add_record(record);
            }
            {
                let mut state = handle.state.lock().await;
                state.record_task(succeeded);
            }
            self.progress.update(handle.execution_id, 1).await;

            processed += 1;
            if self.config.checkpoint_every > 0 && processed % self.config.checkpoint_every == 0 {
                self.checkpoint(&handle).await;
            }
        }
    }

    /// Best-effort checkpoint. Failures are logged and skipped — the
    /// in-memory state stays the source of truth.
    async fn checkpoint(&self, handle: &ExecutionHandle) {
        let state = handle.state.lock().await.clone();
        let report = handle.report.lock().await.build(state.state);
        if let Err(e) = self
            .gateway
            .save_checkpoint(handle.execution_id, &state, &report)
            .await
        {
            tracing::error!(
                execution = %handle.execution_id,
                error = %e,
                "checkpoint failed; continuing with in-memory state"
            );
        }
    }

    /// Final checkpoint + report save once a terminal state is reached.
    async fn finalize(&self, handle: &ExecutionHandle) {
        self.checkpoint(handle).await;
        let state = handle.state.lock().await.clone();
        let report = handle.report.lock().await.build(state.state);
        if let Err(e) = self
            .gateway
            .save_final_report(handle.execution_id, &report)
            .await
        {
            tracing::error!(
                execution = %handle.execution_id,
                error = %e,
                "final report save failed"
            );
        }
    }
}

async fn call_adapter(
    adapters: &AdapterRegistry,
    config: &EngineConfig,
    task: &DiagnosisTask,
) -> Result<ChatResponse, AdapterError> {
    let adapter = adapters.get(&task.model)?;
    retry_send(&config.retry, || {
        let adapter = Arc::clone(&adapter);
        let prompt = task.question.clone();
        let model = task.model.clone();
        let timeout = config.adapter_timeout;
        async move {
            match tokio::time::timeout(timeout, adapter.send(&prompt, &model)).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout {
                    secs: timeout.as_secs(),
                }),
            }
        }
    })
    .await
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent_of(state: &ExecutionState) -> u8 {
    if state.total == 0 {
        100
    } else {
        (f64::from(state.completed) / f64::from(state.total) * 100.0).round() as u8
    }
}
