//! Runtime configuration (C10, ambient).
//!
//! Grounded on `VPRamon-TSI/backend/src/db/factory.rs`'s `RepositoryType::
//! from_env` pattern: a handful of environment variables, each with a
//! documented default, parsed once at startup rather than threaded through
//! call sites.

use std::env;

const ENV_SOLVER_LICENSE: &str = "HOSPITAL_SCHEDULER_SOLVER_LICENSE";
const ENV_MAX_CONCURRENT_SOLVES: &str = "HOSPITAL_SCHEDULER_MAX_CONCURRENT_SOLVES";
const ENV_QUEUE_BOUND: &str = "HOSPITAL_SCHEDULER_QUEUE_BOUND";

const DEFAULT_MAX_CONCURRENT_SOLVES: usize = 1;
const DEFAULT_QUEUE_BOUND: usize = 64;

/// Process-wide configuration, read once at startup (spec §5, ambient
/// logging/config stack).
#[derive(Debug, Clone)]
pub struct Config {
    /// Passed through to the MILP backend's license hook, if any. `None`
    /// when the backend needs no license (the bundled HiGHS solver doesn't).
    pub solver_license: Option<String>,
    /// Width of the bounded worker pool the orchestrator (C5) runs solves on.
    pub max_concurrent_solves: usize,
    /// Bound on the orchestrator's pending-work queue (spec §5 "Admission").
    pub queue_bound: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            solver_license: env::var(ENV_SOLVER_LICENSE).ok().filter(|s| !s.is_empty()),
            max_concurrent_solves: parse_env_or(ENV_MAX_CONCURRENT_SOLVES, DEFAULT_MAX_CONCURRENT_SOLVES),
            queue_bound: parse_env_or(ENV_QUEUE_BOUND, DEFAULT_QUEUE_BOUND),
        }
    }
}

fn parse_env_or(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v: &usize| v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_falls_back_on_missing_or_invalid() {
        assert_eq!(parse_env_or("HOSPITAL_SCHEDULER_TEST_UNSET_XYZ", 7), 7);
    }

    #[test]
    fn parse_env_or_rejects_zero() {
        std::env::set_var("HOSPITAL_SCHEDULER_TEST_ZERO", "0");
        assert_eq!(parse_env_or("HOSPITAL_SCHEDULER_TEST_ZERO", 9), 9);
        std::env::remove_var("HOSPITAL_SCHEDULER_TEST_ZERO");
    }
}
