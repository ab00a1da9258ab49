//! Solve orchestration (C5, spec §5).
//!
//! Re-architects the teacher's implicit `rayon::spawn` background solve
//! (`api.rs::create_schedule`) into an explicit bounded worker pool: a
//! `Semaphore` caps in-flight solves, an `mpsc` channel gives FIFO admission
//! order, and a `watch<bool>` channel lets shutdown reach both queued and
//! in-flight runs without an out-of-band cancellation flag per run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

use crate::catalog::CatalogRepository;
use crate::config::Config;
use crate::enrich::{self, EnrichedAssignment};
use crate::error::CoreError;
use crate::model::{self, ModelConfig};
use crate::registry::{RunRegistry, RunStatus, RunSummary};
use crate::request::ScheduleRequest;
use crate::solver::{MilpBackend, Termination};

/// Everything the status endpoint needs for one run, assignments enriched
/// against the catalog only when the run succeeded (spec §4.6, §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub objective_value: Option<f64>,
    pub logs: String,
    pub assignments: Vec<EnrichedAssignment>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub struct Orchestrator {
    catalog: Arc<dyn CatalogRepository>,
    registry: Arc<dyn RunRegistry>,
    backend: Arc<dyn MilpBackend>,
    model_config: ModelConfig,
    semaphore: Arc<Semaphore>,
    queue_tx: mpsc::Sender<Uuid>,
    cancel_tx: watch::Sender<bool>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        registry: Arc<dyn RunRegistry>,
        backend: Arc<dyn MilpBackend>,
        model_config: ModelConfig,
        config: &Config,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_bound);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let orchestrator = Arc::new(Self {
            catalog,
            registry,
            backend,
            model_config,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_solves)),
            queue_tx,
            cancel_tx,
        });
        tokio::spawn(Self::dispatch(orchestrator.clone(), queue_rx, cancel_rx));
        orchestrator
    }

    /// Validates, reserves a queue slot, creates the run record, and hands it
    /// off to the dispatcher. Reserving the slot *before* creating the run
    /// means a saturated queue (spec §6 "503 when the worker pool is
    /// saturated beyond a configurable queue bound") never leaves a QUEUED
    /// row behind that nothing will pick up.
    ///
    /// A reservation can fail two ways, and they mean different things: the
    /// channel is `Full` (genuine saturation, spec §6) or already `Closed`
    /// (the dispatcher has drained and shut down, spec §5 "Cancellation").
    /// The latter races `shutdown()` against `submit()` — rather than surface
    /// a spurious `Saturated` for a submission that arrived a moment after
    /// shutdown, finalize it the same way the dispatcher would have: ERROR
    /// "not started".
    pub async fn submit(&self, request: ScheduleRequest) -> Result<Uuid, CoreError> {
        request.validate()?;
        match self.queue_tx.try_reserve() {
            Ok(permit) => {
                let run_id = self.registry.create(request).await;
                permit.send(run_id);
                Ok(run_id)
            }
            Err(mpsc::error::TrySendError::Full(())) => Err(CoreError::Saturated),
            Err(mpsc::error::TrySendError::Closed(())) => {
                let run_id = self.registry.create(request).await;
                let _ = self
                    .registry
                    .finalize(run_id, RunStatus::Error, None, Vec::new(), "cancelled: not started".to_string())
                    .await;
                Ok(run_id)
            }
        }
    }

    /// Current state of a run, with enriched assignments when terminal and
    /// successful (spec §4.6, §6).
    pub async fn status(&self, run_id: Uuid) -> Result<RunView, CoreError> {
        let run = self.registry.get(run_id).await?;
        let assignments = if run.status.is_success() {
            let snapshot = self.catalog.snapshot().await;
            enrich::enrich(&snapshot, &run.assignments)
        } else {
            Vec::new()
        };
        Ok(RunView {
            run_id: run.run_id,
            status: run.status,
            objective_value: run.objective_value,
            logs: run.logs,
            assignments,
            created_at: run.created_at,
            completed_at: run.completed_at,
        })
    }

    /// Summaries only, no enrichment (spec §6).
    pub async fn list(&self) -> Vec<RunSummary> {
        self.registry.list().await
    }

    /// Signals shutdown: queued runs are finalized ERROR "not started",
    /// in-flight runs are finalized ERROR "cancelled" as soon as they next
    /// observe the flag (spec §5 "Cancellation").
    pub fn shutdown(&self) {
        let _ = self.cancel_tx.send(true);
    }

    async fn dispatch(
        self_arc: Arc<Self>,
        mut queue_rx: mpsc::Receiver<Uuid>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || !*cancel_rx.borrow() {
                        continue;
                    }
                    queue_rx.close();
                    while let Ok(run_id) = queue_rx.try_recv() {
                        let _ = self_arc
                            .registry
                            .finalize(run_id, RunStatus::Error, None, Vec::new(), "cancelled: not started".to_string())
                            .await;
                    }
                    return;
                }
                next = queue_rx.recv() => {
                    match next {
                        Some(run_id) => {
                            let permit = match self_arc.semaphore.clone().acquire_owned().await {
                                Ok(p) => p,
                                Err(_) => return,
                            };
                            let worker = self_arc.clone();
                            let worker_cancel_rx = cancel_rx.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                worker.run_one(run_id, worker_cancel_rx).await;
                            });
                        }
                        None => return,
                    }
                }
            }
        }
    }

    async fn run_one(&self, run_id: Uuid, mut cancel_rx: watch::Receiver<bool>) {
        if *cancel_rx.borrow() {
            let _ = self
                .registry
                .finalize(run_id, RunStatus::Error, None, Vec::new(), "cancelled: not started".to_string())
                .await;
            return;
        }
        if self.registry.mark_running(run_id).await.is_err() {
            return; // already terminal (cancelled while queued, or a stray re-delivery)
        }

        let run = match self.registry.get(run_id).await {
            Ok(r) => r,
            Err(_) => return,
        };
        let request = run.request;
        let snapshot = self.catalog.snapshot().await;
        let model_config = self.model_config.clone();
        let (built_model, build_warnings) = model::build_model(&snapshot, &request, &model_config);

        let backend = self.backend.clone();
        let penalty = request.penalty_uncovered;
        let time_limit = request.solver_time_limit_secs;
        let hard_ceiling = Duration::from_secs(time_limit as u64 + 30);

        let solve_task = tokio::task::spawn_blocking(move || backend.solve(&built_model, penalty, time_limit));

        let termination = tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_ok() && *cancel_rx.borrow() {
                    let _ = self
                        .registry
                        .finalize(run_id, RunStatus::Error, None, Vec::new(), "cancelled: in-flight".to_string())
                        .await;
                }
                return;
            }
            outcome = tokio::time::timeout(hard_ceiling, solve_task) => {
                match outcome {
                    Ok(Ok(termination)) => termination,
                    Ok(Err(join_err)) => {
                        let _ = self
                            .registry
                            .finalize(
                                run_id,
                                RunStatus::Error,
                                None,
                                Vec::new(),
                                format!("solve: backend task failed: {join_err}"),
                            )
                            .await;
                        return;
                    }
                    Err(_elapsed) => {
                        let _ = self
                            .registry
                            .finalize(
                                run_id,
                                RunStatus::Error,
                                None,
                                Vec::new(),
                                "solve: force-finalized after exceeding the hard ceiling".to_string(),
                            )
                            .await;
                        return;
                    }
                }
            }
        };

        let mut logs = build_warnings.join("; ");
        let (status, objective_value, assignments) = match termination {
            Termination::Optimal(values) => (RunStatus::Optimal, Some(values.objective_value), values.assignments),
            Termination::Feasible(values) => (RunStatus::Feasible, Some(values.objective_value), values.assignments),
            Termination::Infeasible(conflicts) => {
                let text: Vec<String> = conflicts.iter().map(|c| format!("{}: {}", c.family, c.message)).collect();
                append_log(&mut logs, &text.join(" | "));
                (RunStatus::Infeasible, None, Vec::new())
            }
            Termination::BackendError { stage, message } => {
                append_log(&mut logs, &format!("{stage}: {message}"));
                (RunStatus::Error, None, Vec::new())
            }
        };

        let _ = self.registry.finalize(run_id, status, objective_value, assignments, logs).await;
    }
}

fn append_log(logs: &mut String, text: &str) {
    if !logs.is_empty() {
        logs.push_str("; ");
    }
    logs.push_str(text);
}
