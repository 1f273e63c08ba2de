//! Graph scheduler.
//!
//! Executes stages as soon as their dependencies reach a terminal state,
//! up to a worker limit, routing each stage's output to its dependents.

use super::{PipelineGraph, PipelineRun, StageExecutor, StageOutcome, StageRecord, StageSpec};
use crate::context::{RunContext, RunIdentity, StageInputs};
use crate::core::{RecordStream, RunStatus, StageStatus};
use crate::errors::EtlflowError;
use crate::events::EventKind;
use crate::progress::{LogEntry, LogEventKind};
use crate::utils::now_utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How a critical stage failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Skip the failed stage's dependents, finish independent branches.
    #[default]
    ContinueIndependent,
    /// Skip every stage that has not started yet.
    FailFast,
}

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum stages running at once.
    pub max_workers: usize,
    /// Reaction to critical failures.
    pub failure_mode: FailureMode,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            failure_mode: FailureMode::ContinueIndependent,
        }
    }
}

impl SchedulerConfig {
    /// Sets the worker limit (at least 1).
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

/// Executes pipeline graphs.
///
/// Ready stages are dispatched in declaration order, so the same graph with
/// the same action outcomes always yields the same partial order.
#[derive(Debug, Clone)]
pub struct Scheduler {
    executor: Arc<StageExecutor>,
    config: SchedulerConfig,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(StageExecutor::default())
    }
}

/// Mutable bookkeeping for one run.
struct RunState {
    records: HashMap<String, StageRecord>,
    remaining: HashMap<String, usize>,
    ready: BTreeSet<usize>,
    outputs: HashMap<String, RecordStream>,
    critical_failed: bool,
}

impl Scheduler {
    /// Creates a scheduler around a stage executor.
    #[must_use]
    pub fn new(executor: StageExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            config: SchedulerConfig::default(),
        }
    }

    /// Sets the scheduler configuration.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the stage executor.
    #[must_use]
    pub fn executor(&self) -> &StageExecutor {
        &self.executor
    }

    /// Runs the graph once with a fresh run context.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn execute(&self, graph: &PipelineGraph) -> Result<PipelineRun, EtlflowError> {
        let identity = RunIdentity::new(graph.name(), graph.owner());
        self.run(graph, Arc::new(RunContext::new(identity))).await
    }

    /// Runs the graph once.
    ///
    /// Stage failures never surface as `Err`; they are reported in the
    /// returned run.
    ///
    /// # Errors
    ///
    /// Returns `EtlflowError::Internal` if a stage task could not be joined
    /// or the graph stalls.
    pub async fn run(&self, graph: &PipelineGraph, run: Arc<RunContext>) -> Result<PipelineRun, EtlflowError> {
        let run_id = run.run_id();
        let started_at = now_utc();
        let order = graph.declaration_order();

        self.executor.record(&LogEntry::run(
            run_id,
            graph.name(),
            LogEventKind::Started,
            format!("{} stage(s)", graph.stage_count()),
        ));
        run.emit_run_event(
            EventKind::RunStarted,
            serde_json::json!({ "pipeline": graph.name(), "stages": graph.stage_count() }),
        );
        info!(pipeline = graph.name(), %run_id, stages = graph.stage_count(), "pipeline run started");

        let mut state = RunState {
            records: graph
                .stages()
                .map(|s| (s.name.clone(), StageRecord::pending(&s.name, s.kind, s.critical)))
                .collect(),
            remaining: graph
                .stages()
                .map(|s| (s.name.clone(), s.dependencies.len()))
                .collect(),
            ready: graph
                .stages()
                .enumerate()
                .filter(|(_, s)| s.dependencies.is_empty())
                .map(|(i, _)| i)
                .collect(),
            outputs: HashMap::new(),
            critical_failed: false,
        };

        let mut active: FuturesUnordered<JoinHandle<(String, StageOutcome)>> = FuturesUnordered::new();
        let max_workers = self.config.max_workers.max(1);

        loop {
            while active.len() < max_workers {
                let Some(index) = state.ready.pop_first() else {
                    break;
                };
                let name = &order[index];
                let Some(spec) = graph.stage(name) else {
                    continue;
                };
                let Some(record) = state.records.get_mut(name) else {
                    continue;
                };
                if record.status != StageStatus::Pending {
                    continue;
                }
                record.status = StageStatus::Running;

                let inputs = collect_inputs(spec, &state.outputs);
                active.push(self.spawn_stage(spec.clone(), inputs, Arc::clone(&run)));
            }

            let Some(joined) = active.next().await else {
                break;
            };
            let (name, outcome) =
                joined.map_err(|e| EtlflowError::Internal(format!("Task join error: {e}")))?;
            let Some(spec) = graph.stage(&name) else {
                continue;
            };
            self.complete(graph, spec, outcome, &mut state, &run);
        }

        let stalled: Vec<&str> = order
            .iter()
            .filter(|n| state.records.get(*n).is_some_and(|r| !r.status.is_terminal()))
            .map(String::as_str)
            .collect();
        if !stalled.is_empty() {
            return Err(EtlflowError::Internal(format!(
                "Deadlocked stage graph; remaining stages: {stalled:?}"
            )));
        }

        let status = if state.critical_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };
        let stages: Vec<StageRecord> = order
            .iter()
            .filter_map(|n| state.records.remove(n))
            .collect();
        let failed = stages.iter().filter(|r| r.status == StageStatus::Failed).count();
        let skipped = stages.iter().filter(|r| r.status == StageStatus::Skipped).count();
        let summary = format!("{failed} failed, {skipped} skipped");

        let kind = if status.is_success() {
            LogEventKind::Ended
        } else {
            LogEventKind::Failed
        };
        self.executor
            .record(&LogEntry::run(run_id, graph.name(), kind, &summary));
        run.emit_run_event(
            EventKind::RunCompleted,
            serde_json::json!({ "status": status, "failed": failed, "skipped": skipped }),
        );
        if status.is_success() {
            info!(pipeline = graph.name(), %run_id, failed, skipped, "pipeline run succeeded");
        } else {
            warn!(pipeline = graph.name(), %run_id, failed, skipped, "pipeline run failed");
        }

        Ok(PipelineRun {
            run_id,
            pipeline: graph.name().to_string(),
            status,
            started_at,
            ended_at: now_utc(),
            stages,
            outputs: state.outputs,
        })
    }

    /// Spawns a task to execute a single stage.
    fn spawn_stage(
        &self,
        spec: StageSpec,
        inputs: StageInputs,
        run: Arc<RunContext>,
    ) -> JoinHandle<(String, StageOutcome)> {
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let outcome = executor.execute(&spec, &inputs, &run).await;
            (spec.name, outcome)
        })
    }

    /// Applies a finished stage's outcome and releases or skips dependents.
    fn complete(
        &self,
        graph: &PipelineGraph,
        spec: &StageSpec,
        outcome: StageOutcome,
        state: &mut RunState,
        run: &RunContext,
    ) {
        if let Some(record) = state.records.get_mut(&spec.name) {
            record.status = outcome.status;
            record.attempts = outcome.attempts;
            record.started_at = Some(outcome.started_at);
            record.ended_at = Some(outcome.ended_at);
            record.rows = outcome.output.as_ref().map(RecordStream::len);
            record.error = outcome.error.as_ref().map(|e| e.last_error.to_string());
        }

        if outcome.is_success() {
            if let Some(output) = outcome.output {
                state.outputs.insert(spec.name.clone(), output);
            }
            release_dependents(graph, &spec.name, state);
            return;
        }

        if spec.critical {
            state.critical_failed = true;
            if self.config.failure_mode == FailureMode::FailFast {
                run.halt();
                let reason = format!("pipeline halted after critical stage '{}' failed", spec.name);
                for name in graph.declaration_order() {
                    skip_stage(name, &reason, state, run);
                }
                return;
            }
        }

        if spec.failure_blocks_dependents() {
            let reason = format!("upstream stage '{}' failed", spec.name);
            for name in graph.downstream(&spec.name) {
                skip_stage(&name, &reason, state, run);
            }
        } else {
            release_dependents(graph, &spec.name, state);
        }
    }
}

/// Builds a stage's inputs from the outputs of its succeeded dependencies.
fn collect_inputs(spec: &StageSpec, outputs: &HashMap<String, RecordStream>) -> StageInputs {
    let streams = spec
        .dependencies
        .iter()
        .filter_map(|dep| outputs.get(dep).map(|s| (dep.clone(), s.clone())))
        .collect();
    StageInputs::new(streams, spec.dependencies.clone(), &spec.name)
}

fn release_dependents(graph: &PipelineGraph, name: &str, state: &mut RunState) {
    for child in graph.dependents(name) {
        let Some(count) = state.remaining.get_mut(child) else {
            continue;
        };
        *count = count.saturating_sub(1);
        let pending = state
            .records
            .get(child)
            .is_some_and(|r| r.status == StageStatus::Pending);
        if *count == 0 && pending {
            if let Some(index) = graph.position(child) {
                state.ready.insert(index);
            }
        }
    }
}

/// Marks a not-yet-started stage as skipped. Started stages are left alone.
fn skip_stage(name: &str, reason: &str, state: &mut RunState, run: &RunContext) {
    let Some(record) = state.records.get_mut(name) else {
        return;
    };
    if record.status != StageStatus::Pending {
        return;
    }
    record.status = StageStatus::Skipped;
    record.error = Some(reason.to_string());
    run.emit_stage_event(
        EventKind::StageSkipped,
        name,
        serde_json::json!({ "reason": reason }),
    );
    info!(stage = name, reason, "stage skipped");
}
