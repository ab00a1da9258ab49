//! Run registry (C2, spec §3 & §4.3).
//!
//! The single mutable shared resource in the system (spec §5): every status
//! write funnels through [`RunRegistry::finalize`] or
//! [`RunRegistry::mark_running`], both implemented here as a single
//! lock-guarded compare-and-set so two workers racing on the same run id
//! cannot both win a terminal write.
//!
//! Grounded on `VPRamon-TSI/backend/src/services/job_tracker.rs`'s in-memory
//! job map (status/log/timestamp fields behind a `parking_lot::RwLock`),
//! generalized to the six-state lifecycle and the `TerminalConflict`
//! assertion spec §4.3/§7 require.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{CoreError, TerminalConflict};
use crate::request::ScheduleRequest;

/// Closed set of run statuses (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Queued,
    Running,
    Optimal,
    Feasible,
    Infeasible,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Optimal | RunStatus::Feasible | RunStatus::Infeasible | RunStatus::Error
        )
    }

    pub fn is_success(self) -> bool {
        matches!(self, RunStatus::Optimal | RunStatus::Feasible)
    }
}

/// A raw (unenriched) assignment of one employee to one shift on one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAssignment {
    pub employee_id: String,
    pub date: NaiveDate,
    pub shift_id: String,
    pub hours: f64,
    pub cost: f64,
}

/// A scheduling run. `completed_at` is non-null iff `status` is terminal;
/// `objective_value` is non-null iff `status` is OPTIMAL or FEASIBLE;
/// `assignments` is non-empty only for those two states (spec §3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub request: ScheduleRequest,
    pub objective_value: Option<f64>,
    pub logs: String,
    pub assignments: Vec<RawAssignment>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lightweight summary for the list endpoint (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub objective_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assignment_count: usize,
}

impl From<&Run> for RunSummary {
    fn from(run: &Run) -> Self {
        RunSummary {
            run_id: run.run_id,
            status: run.status,
            objective_value: run.objective_value,
            created_at: run.created_at,
            completed_at: run.completed_at,
            assignment_count: run.assignments.len(),
        }
    }
}

#[async_trait]
pub trait RunRegistry: Send + Sync {
    async fn create(&self, request: ScheduleRequest) -> Uuid;
    /// QUEUED -> RUNNING. Idempotent against a second call while already
    /// RUNNING; returns `TerminalConflict` if the run already reached a
    /// terminal state (spec §4.3).
    async fn mark_running(&self, run_id: Uuid) -> Result<(), TerminalConflict>;
    /// Any non-terminal -> terminal. May only succeed once per run; a second
    /// call returns `TerminalConflict` and is discarded (spec §4.3, §7).
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        run_id: Uuid,
        status: RunStatus,
        objective_value: Option<f64>,
        assignments: Vec<RawAssignment>,
        logs: String,
    ) -> Result<(), TerminalConflict>;
    async fn get(&self, run_id: Uuid) -> Result<Run, CoreError>;
    /// Summaries ordered by `created_at` descending.
    async fn list(&self) -> Vec<RunSummary>;
}

pub struct InMemoryRunRegistry {
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl InMemoryRunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: RwLock::new(HashMap::new()),
        })
    }
}

impl Default for InMemoryRunRegistry {
    fn default() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RunRegistry for InMemoryRunRegistry {
    async fn create(&self, request: ScheduleRequest) -> Uuid {
        let run_id = Uuid::new_v4();
        let run = Run {
            run_id,
            status: RunStatus::Queued,
            request,
            objective_value: None,
            logs: String::new(),
            assignments: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        };
        self.runs.write().insert(run_id, run);
        run_id
    }

    async fn mark_running(&self, run_id: Uuid) -> Result<(), TerminalConflict> {
        let mut runs = self.runs.write();
        let run = match runs.get_mut(&run_id) {
            Some(r) => r,
            None => return Ok(()), // nothing to transition; caller will see NotFound on get()
        };
        match run.status {
            RunStatus::Queued => {
                run.status = RunStatus::Running;
                Ok(())
            }
            RunStatus::Running => Ok(()), // idempotent-safe against double-start
            _ => Err(TerminalConflict(run_id)),
        }
    }

    async fn finalize(
        &self,
        run_id: Uuid,
        status: RunStatus,
        objective_value: Option<f64>,
        assignments: Vec<RawAssignment>,
        logs: String,
    ) -> Result<(), TerminalConflict> {
        debug_assert!(status.is_terminal(), "finalize must target a terminal status");
        let mut runs = self.runs.write();
        let run = runs.get_mut(&run_id).ok_or(TerminalConflict(run_id))?;
        if run.status.is_terminal() {
            return Err(TerminalConflict(run_id));
        }
        run.status = status;
        run.objective_value = objective_value;
        run.assignments = assignments;
        run.logs = logs;
        run.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, run_id: Uuid) -> Result<Run, CoreError> {
        self.runs
            .read()
            .get(&run_id)
            .cloned()
            .ok_or(CoreError::NotFound(run_id))
    }

    async fn list(&self) -> Vec<RunSummary> {
        let mut summaries: Vec<RunSummary> = self.runs.read().values().map(RunSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ScheduleRequest {
        ScheduleRequest {
            horizon_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            horizon_days: 7,
            solver_time_limit_secs: 30,
            allow_uncovered_demand: false,
            penalty_uncovered: 0.0,
            preference_weight: 1.0,
            max_consecutive_days: 3,
            min_rest_hours: 10.0,
            max_night_shifts: 5,
            min_shifts_per_employee: 0,
            require_complete_weekends: false,
        }
    }

    #[tokio::test]
    async fn create_starts_queued_with_no_completed_at() {
        let registry = InMemoryRunRegistry::new();
        let run_id = registry.create(sample_request()).await;
        let run = registry.get(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.completed_at.is_none());
    }

    #[tokio::test]
    async fn double_start_is_idempotent() {
        let registry = InMemoryRunRegistry::new();
        let run_id = registry.create(sample_request()).await;
        registry.mark_running(run_id).await.unwrap();
        registry.mark_running(run_id).await.unwrap();
        assert_eq!(registry.get(run_id).await.unwrap().status, RunStatus::Running);
    }

    #[tokio::test]
    async fn double_finalize_is_rejected() {
        let registry = InMemoryRunRegistry::new();
        let run_id = registry.create(sample_request()).await;
        registry.mark_running(run_id).await.unwrap();
        registry
            .finalize(run_id, RunStatus::Optimal, Some(10.0), vec![], "ok".into())
            .await
            .unwrap();
        let second = registry
            .finalize(run_id, RunStatus::Error, None, vec![], "late".into())
            .await;
        assert!(second.is_err());
        let run = registry.get(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Optimal); // first write wins
    }

    #[tokio::test]
    async fn finalize_sets_completed_at_and_matches_invariants() {
        let registry = InMemoryRunRegistry::new();
        let run_id = registry.create(sample_request()).await;
        registry.mark_running(run_id).await.unwrap();
        registry
            .finalize(run_id, RunStatus::Infeasible, None, vec![], "conflict".into())
            .await
            .unwrap();
        let run = registry.get(run_id).await.unwrap();
        assert!(run.completed_at.is_some());
        assert!(run.objective_value.is_none());
        assert!(run.assignments.is_empty());
    }

    #[tokio::test]
    async fn list_orders_by_created_at_desc() {
        let registry = InMemoryRunRegistry::new();
        let first = registry.create(sample_request()).await;
        let second = registry.create(sample_request()).await;
        let summaries = registry.list().await;
        let idx_first = summaries.iter().position(|s| s.run_id == first).unwrap();
        let idx_second = summaries.iter().position(|s| s.run_id == second).unwrap();
        assert!(idx_second <= idx_first);
    }

    #[tokio::test]
    async fn get_unknown_run_is_not_found() {
        let registry = InMemoryRunRegistry::new();
        let err = registry.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
