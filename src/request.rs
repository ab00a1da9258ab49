//! Request/result contract (C7, spec §3 & §4.1).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A validated scheduling request covering one planning horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    pub horizon_start: NaiveDate,
    pub horizon_days: i64,
    pub solver_time_limit_secs: u32,
    pub allow_uncovered_demand: bool,
    pub penalty_uncovered: f64,
    pub preference_weight: f64,
    pub max_consecutive_days: i64,
    pub min_rest_hours: f64,
    pub max_night_shifts: i64,
    pub min_shifts_per_employee: i64,
    pub require_complete_weekends: bool,
}

impl ScheduleRequest {
    /// Validates the request per spec §4.1. Returns the first violated field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=28).contains(&self.horizon_days) {
            return Err(CoreError::invalid(
                "horizon_days",
                "must be in [1, 28]",
            ));
        }
        if !(1..=600).contains(&self.solver_time_limit_secs) {
            return Err(CoreError::invalid(
                "solver_time_limit_secs",
                "must be in [1, 600]",
            ));
        }
        if self.allow_uncovered_demand && self.penalty_uncovered < 0.0 {
            return Err(CoreError::invalid(
                "penalty_uncovered",
                "must be >= 0 when allow_uncovered_demand is true",
            ));
        }
        if !(1..=self.horizon_days).contains(&self.max_consecutive_days) {
            return Err(CoreError::invalid(
                "max_consecutive_days",
                "must be in [1, horizon_days]",
            ));
        }
        if !(0.0..=24.0).contains(&self.min_rest_hours) {
            return Err(CoreError::invalid(
                "min_rest_hours",
                "must be in [0, 24]",
            ));
        }
        if self.max_night_shifts < 0 {
            return Err(CoreError::invalid(
                "max_night_shifts",
                "must be >= 0",
            ));
        }
        if self.min_shifts_per_employee < 0 {
            return Err(CoreError::invalid(
                "min_shifts_per_employee",
                "must be >= 0",
            ));
        }
        Ok(())
    }
}
