//! Error types surfaced synchronously by the public API (C7, see spec §7).
//!
//! Run-outcome failures (infeasibility, backend errors, cancellation) are not
//! modeled here — they are terminal [`crate::registry::RunStatus`] values
//! carried in the run record itself, never propagated as `Result::Err` out of
//! [`crate::orchestrator::Orchestrator::submit`] or `status`.

use uuid::Uuid;

/// Errors returned synchronously from the public entry points.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A request failed validation (spec §4.1). No run is created.
    #[error("invalid request: field `{field}`: {reason}")]
    InvalidRequest { field: String, reason: String },

    /// `status`/`list` was asked about a run id that does not exist.
    #[error("run {0} not found")]
    NotFound(Uuid),

    /// The worker pool's pending-work queue is full (spec §5 "queue depth
    /// ... observable"; spec §6 "503 when the worker pool is saturated
    /// beyond a configurable queue bound"). No run is created.
    #[error("worker pool saturated: queue bound exceeded")]
    Saturated,
}

impl CoreError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Internal assertion error: a run was finalized twice. Never surfaced to an
/// end user; the registry logs it and the second write is discarded.
#[derive(Debug, thiserror::Error)]
#[error("run {0} was already finalized (double finalize)")]
pub struct TerminalConflict(pub Uuid);

/// The pipeline stage a backend failure occurred in, carried in
/// [`crate::registry::RunStatus::Error`]'s log text per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStage {
    Build,
    Solve,
    Extract,
}

impl std::fmt::Display for SolveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SolveStage::Build => "build",
            SolveStage::Solve => "solve",
            SolveStage::Extract => "extract",
        };
        f.write_str(s)
    }
}
