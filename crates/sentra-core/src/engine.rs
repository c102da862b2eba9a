//! Automated response execution engine.
//!
//! The engine owns a run from creation to a settled status. Steps
//! execute strictly in order; a step failure or timeout is recorded
//! and the run continues. Per-asset exclusivity comes from the shared
//! lock registry, and the step timeout covers lock wait plus action
//! execution.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::dispatch::{ActionDispatch, StepInvocation};
use crate::event::SecurityEvent;
use crate::locks::AssetLockRegistry;
use crate::playbook::{Playbook, PlaybookStep, ValidationError};
use crate::response::{AutomatedResponse, ExecutionStatus, StepResult};
use crate::store::{ResponseStore, StoreError};

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// At most one in-flight run per (event, playbook) pair.
    #[error("a run for event {event_id} and playbook {playbook_id} is already in flight")]
    DuplicateRun { event_id: Uuid, playbook_id: Uuid },

    /// The playbook failed write-time validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cancellation is only valid while the run is `Running`.
    #[error("run {id} in status {status} cannot be cancelled")]
    NotCancellable { id: Uuid, status: ExecutionStatus },

    /// The engine's worker pool has been closed.
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Drives playbook runs against triggering events.
pub struct ResponseEngine {
    responses: Arc<dyn ResponseStore>,
    dispatch: Arc<dyn ActionDispatch>,
    locks: Arc<AssetLockRegistry>,
    permits: Arc<Semaphore>,
    default_step_timeout: Duration,
    in_flight: Mutex<HashSet<(Uuid, Uuid)>>,
    cancel_flags: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl ResponseEngine {
    /// Creates an engine with the configured worker bound.
    pub fn new(
        responses: Arc<dyn ResponseStore>,
        dispatch: Arc<dyn ActionDispatch>,
        locks: Arc<AssetLockRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            responses,
            dispatch,
            locks,
            permits: Arc::new(Semaphore::new(config.max_concurrent_runs)),
            default_step_timeout: Duration::from_secs(config.default_step_timeout_secs),
            in_flight: Mutex::new(HashSet::new()),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a run in `Pending`, snapshotting the playbook's steps
    /// and the event's assets. Rejects a second in-flight run for the
    /// same (event, playbook) pair.
    #[instrument(skip(self, event, playbook), fields(event_id = %event.id, playbook_id = %playbook.id))]
    pub async fn create_run(
        &self,
        event: &SecurityEvent,
        playbook: &Playbook,
        confidence: u8,
    ) -> Result<AutomatedResponse, EngineError> {
        playbook.validate()?;

        let pair = (event.id, playbook.id);
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(pair) {
                return Err(EngineError::DuplicateRun {
                    event_id: event.id,
                    playbook_id: playbook.id,
                });
            }
        }

        let run = AutomatedResponse::new(event, playbook, confidence);
        match self.responses.create(run).await {
            Ok(run) => {
                self.cancel_flags
                    .lock()
                    .await
                    .insert(run.id, Arc::new(AtomicBool::new(false)));
                info!(run_id = %run.id, "run created");
                Ok(run)
            }
            Err(err) => {
                self.in_flight.lock().await.remove(&pair);
                Err(err.into())
            }
        }
    }

    /// Creates a run and spawns its driver task. Returns the run in
    /// `Pending`; the task carries it to a settled status.
    pub async fn submit(
        self: &Arc<Self>,
        event: &SecurityEvent,
        playbook: &Playbook,
        confidence: u8,
    ) -> Result<AutomatedResponse, EngineError> {
        let run = self.create_run(event, playbook, confidence).await?;
        let engine = Arc::clone(self);
        let run_id = run.id;
        tokio::spawn(async move {
            if let Err(err) = engine.execute_run(run_id).await {
                warn!(%run_id, error = %err, "run driver failed");
            }
        });
        Ok(run)
    }

    /// Executes a pending run to a settled status and returns the
    /// final record.
    #[instrument(skip(self), fields(%run_id))]
    pub async fn execute_run(&self, run_id: Uuid) -> Result<AutomatedResponse, EngineError> {
        let run = self.responses.get(run_id).await?;

        // Confidence gate: below the snapshotted threshold the run
        // settles without executing a single step.
        if run.confidence_at_trigger < run.confidence_threshold {
            info!(
                confidence = run.confidence_at_trigger,
                threshold = run.confidence_threshold,
                "confidence below threshold, skipping"
            );
            let settled = self
                .responses
                .transition(run_id, ExecutionStatus::SkippedLowConfidence)
                .await?;
            self.finish(&settled).await;
            return Ok(settled);
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EngineError::ShuttingDown)?;

        let run = self
            .responses
            .transition(run_id, ExecutionStatus::Running)
            .await?;
        let cancel = self.cancel_flag(run_id).await;

        let mut steps = run.steps.clone();
        steps.sort_by_key(|s| s.step_number);

        let mut cancelled = false;
        for step in &steps {
            if cancel.load(Ordering::Relaxed) {
                info!(step = step.step_number, "cancellation honored at step boundary");
                cancelled = true;
                break;
            }
            let result = self.execute_step(&run, step).await;
            self.responses.append_step_result(run_id, result).await?;
        }

        let final_status = if cancelled {
            ExecutionStatus::Cancelled
        } else {
            self.responses.get(run_id).await?.aggregate_status()
        };
        let settled = self.responses.transition(run_id, final_status).await?;
        info!(status = %settled.execution_status, "run settled");
        self.finish(&settled).await;
        Ok(settled)
    }

    /// Runs one step under its timeout, which covers both the lock
    /// wait and the action execution.
    async fn execute_step(&self, run: &AutomatedResponse, step: &PlaybookStep) -> StepResult {
        let assets: BTreeSet<String> = step
            .explicit_assets()
            .unwrap_or_else(|| run.target_assets.clone());
        let started_at = chrono::Utc::now();
        let timeout = if step.timeout_secs == 0 {
            self.default_step_timeout
        } else {
            Duration::from_secs(step.timeout_secs)
        };
        let deadline = Instant::now() + timeout;

        let ceiling = deadline.saturating_duration_since(Instant::now());
        if self.locks.acquire(run.id, &assets, ceiling).await.is_err() {
            debug!(step = step.step_number, "asset lock wait timed out");
            return StepResult::timeout(step, timeout.as_secs(), started_at);
        }

        let invocation = StepInvocation {
            run_id: run.id,
            step: step.clone(),
            assets: assets.clone(),
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = tokio::time::timeout(remaining, self.dispatch.execute(&invocation)).await;
        self.locks.release(run.id, &assets).await;

        match outcome {
            Ok(Ok(output)) => StepResult::success(
                step,
                output.message,
                output.output,
                output.reversible,
                output.rollback_data,
                started_at,
            ),
            Ok(Err(err)) => {
                warn!(step = step.step_number, error = %err, "step failed");
                StepResult::failure(step, err.to_string(), started_at)
            }
            Err(_) => {
                warn!(step = step.step_number, "step timed out");
                StepResult::timeout(step, timeout.as_secs(), started_at)
            }
        }
    }

    /// Requests cancellation of a running run. The run settles as
    /// `Cancelled` at the next step boundary.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), EngineError> {
        let run = self.responses.get(run_id).await?;
        if run.execution_status != ExecutionStatus::Running {
            return Err(EngineError::NotCancellable {
                id: run_id,
                status: run.execution_status,
            });
        }
        // Lookup only: inserting here would leak a flag entry when
        // the run settles between the status read and this point.
        let flags = self.cancel_flags.lock().await;
        match flags.get(&run_id) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                info!(%run_id, "cancellation requested");
                Ok(())
            }
            None => Err(EngineError::NotCancellable {
                id: run_id,
                status: run.execution_status,
            }),
        }
    }

    async fn cancel_flag(&self, run_id: Uuid) -> Arc<AtomicBool> {
        let mut flags = self.cancel_flags.lock().await;
        Arc::clone(flags.entry(run_id).or_default())
    }

    // Clears the in-flight guard and cancel flag once a run settles.
    async fn finish(&self, run: &AutomatedResponse) {
        self.in_flight
            .lock()
            .await
            .remove(&(run.trigger_event_id, run.playbook_id));
        self.cancel_flags.lock().await.remove(&run.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{DispatchError, DispatchOutput};
    use crate::event::Severity;
    use crate::playbook::ActionType;
    use crate::store::InMemoryResponseStore;
    use async_trait::async_trait;
    use serde_json::json;

    /// Scriptable dispatcher: per-action latency and failure.
    struct ScriptedDispatch {
        fail_on: Option<ActionType>,
        latency: Duration,
    }

    impl ScriptedDispatch {
        fn ok() -> Self {
            Self {
                fail_on: None,
                latency: Duration::ZERO,
            }
        }

        fn failing_on(action: ActionType) -> Self {
            Self {
                fail_on: Some(action),
                latency: Duration::ZERO,
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                fail_on: None,
                latency,
            }
        }
    }

    #[async_trait]
    impl ActionDispatch for ScriptedDispatch {
        fn is_reversible(&self, _action: ActionType) -> bool {
            true
        }

        async fn execute(
            &self,
            invocation: &StepInvocation,
        ) -> Result<DispatchOutput, DispatchError> {
            tokio::time::sleep(self.latency).await;
            if self.fail_on == Some(invocation.step.action) {
                return Err(DispatchError::ExecutionFailed("scripted failure".into()));
            }
            Ok(DispatchOutput::reversible(
                "done",
                json!({ "assets": invocation.assets }),
            ))
        }

        async fn inverse(
            &self,
            _action: ActionType,
            _rollback_data: serde_json::Value,
        ) -> Result<DispatchOutput, DispatchError> {
            Ok(DispatchOutput::irreversible("undone"))
        }
    }

    fn engine(dispatch: Arc<dyn ActionDispatch>) -> Arc<ResponseEngine> {
        Arc::new(ResponseEngine::new(
            Arc::new(InMemoryResponseStore::new()),
            dispatch,
            Arc::new(AssetLockRegistry::new()),
            &EngineConfig::default(),
        ))
    }

    fn event() -> SecurityEvent {
        SecurityEvent::new("ransomware_detected", Severity::Critical)
            .with_asset("ws-01")
            .with_asset("fs-02")
    }

    fn playbook() -> Playbook {
        Playbook::new("Ransomware Containment", "ransomware")
            .with_trigger("ransomware_detected")
            .with_severity(Severity::Critical)
            .with_step(PlaybookStep::new(1, ActionType::IsolateHost))
            .with_step(PlaybookStep::new(2, ActionType::NotifyTeam))
            .with_confidence_threshold(80)
    }

    #[tokio::test]
    async fn test_confident_run_completes() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let run = engine.create_run(&event(), &playbook(), 95).await.unwrap();
        let settled = engine.execute_run(run.id).await.unwrap();
        assert_eq!(settled.execution_status, ExecutionStatus::Completed);
        assert_eq!(settled.step_results.len(), 2);
        assert!(settled.rollback_available);
        assert_eq!(settled.step_results[0].step_number, 1);
        assert_eq!(settled.step_results[1].step_number, 2);
    }

    #[tokio::test]
    async fn test_low_confidence_skips_without_running() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let run = engine.create_run(&event(), &playbook(), 60).await.unwrap();
        let settled = engine.execute_run(run.id).await.unwrap();
        assert_eq!(
            settled.execution_status,
            ExecutionStatus::SkippedLowConfidence
        );
        assert!(settled.step_results.is_empty());
        assert!(settled.started_at.is_none());
    }

    #[tokio::test]
    async fn test_step_failure_recorded_run_continues() {
        let engine = engine(Arc::new(ScriptedDispatch::failing_on(
            ActionType::IsolateHost,
        )));
        let run = engine.create_run(&event(), &playbook(), 95).await.unwrap();
        let settled = engine.execute_run(run.id).await.unwrap();
        assert_eq!(settled.execution_status, ExecutionStatus::PartiallyFailed);
        assert_eq!(settled.step_results.len(), 2);
        assert_eq!(
            settled.step_results[0].outcome,
            crate::response::StepOutcome::Failure
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_timeout_recorded() {
        let engine = engine(Arc::new(ScriptedDispatch::slow(Duration::from_secs(120))));
        let playbook = Playbook::new("Slow", "test")
            .with_trigger("ransomware_detected")
            .with_severity(Severity::Critical)
            .with_step(PlaybookStep::new(1, ActionType::IsolateHost).with_timeout(1));
        let run = engine.create_run(&event(), &playbook, 95).await.unwrap();
        let settled = engine.execute_run(run.id).await.unwrap();
        assert_eq!(settled.execution_status, ExecutionStatus::Failed);
        assert_eq!(
            settled.step_results[0].outcome,
            crate::response::StepOutcome::Timeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_when_step_sets_none() {
        let engine = engine(Arc::new(ScriptedDispatch::slow(Duration::from_secs(120))));
        let playbook = Playbook::new("Slow", "test")
            .with_trigger("ransomware_detected")
            .with_severity(Severity::Critical)
            .with_step(PlaybookStep::new(1, ActionType::IsolateHost).with_timeout(0));
        let run = engine.create_run(&event(), &playbook, 95).await.unwrap();
        let settled = engine.execute_run(run.id).await.unwrap();
        let result = &settled.step_results[0];
        assert_eq!(result.outcome, crate::response::StepOutcome::Timeout);
        // the message reports the 60s default, not the step's unset field
        assert!(result.message.contains("60 seconds"), "{}", result.message);
    }

    #[tokio::test]
    async fn test_duplicate_run_rejected() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let event = event();
        let playbook = playbook();
        engine.create_run(&event, &playbook, 95).await.unwrap();
        let err = engine.create_run(&event, &playbook, 95).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRun { .. }));
    }

    #[tokio::test]
    async fn test_pair_free_after_settle() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let event = event();
        let playbook = playbook();
        let run = engine.create_run(&event, &playbook, 95).await.unwrap();
        engine.execute_run(run.id).await.unwrap();
        // settled run no longer blocks a new one for the same pair
        engine.create_run(&event, &playbook, 95).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_only_while_running() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let run = engine.create_run(&event(), &playbook(), 95).await.unwrap();
        let err = engine.cancel(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotCancellable {
                status: ExecutionStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_flag_cleared_leaves_no_entry() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        // A run stored as Running without going through create_run has
        // no cancel flag, same as a run that settled concurrently.
        let run = AutomatedResponse::new(&event(), &playbook(), 95);
        let run = engine.responses.create(run).await.unwrap();
        engine
            .responses
            .transition(run.id, ExecutionStatus::Running)
            .await
            .unwrap();

        let err = engine.cancel(run.id).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::NotCancellable {
                status: ExecutionStatus::Running,
                ..
            }
        ));
        assert!(engine.cancel_flags.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_isolated_from_playbook_edits() {
        let engine = engine(Arc::new(ScriptedDispatch::ok()));
        let mut playbook = playbook();
        let run = engine.create_run(&event(), &playbook, 95).await.unwrap();
        // mutate after run creation; the run keeps its snapshot
        playbook.steps.push(PlaybookStep::new(3, ActionType::CreateTicket));
        let settled = engine.execute_run(run.id).await.unwrap();
        assert_eq!(settled.step_results.len(), 2);
    }
}
