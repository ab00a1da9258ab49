//! Roster enrichment (C6, spec §4.6).
//!
//! Joins raw assignments against a catalog snapshot into display-ready rows.
//! Grounded on the teacher's `ScheduleDto::from_schedule` join (`dto.rs`),
//! generalized from its employee-index join to a catalog lookup by id, and
//! from raising on a dangling reference to the graceful fallback spec §4.6
//! requires (a deleted employee must not sink an otherwise-successful run).

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogSnapshot;
use crate::registry::RawAssignment;

/// One assignment joined against employee/shift display data (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedAssignment {
    pub employee_id: String,
    pub employee_name: String,
    pub role: String,
    pub date: chrono::NaiveDate,
    pub shift_id: String,
    pub shift_name: String,
    pub hours: f64,
    pub cost: f64,
}

const UNKNOWN_ROLE: &str = "Unknown";

/// Joins `assignments` against `snapshot`, tolerating an employee that was
/// removed from the catalog after the run's solve began (spec §4.6): such a
/// row falls back to `employee_name = employee_id`, `role = "Unknown"`.
/// Ordered by date ascending, then shift start time ascending, then role,
/// then display name (spec §4.6 "Stable ordering").
pub fn enrich(snapshot: &CatalogSnapshot, assignments: &[RawAssignment]) -> Vec<EnrichedAssignment> {
    let mut rows: Vec<EnrichedAssignment> = assignments
        .iter()
        .map(|a| {
            let shift = snapshot.shift(&a.shift_id);
            let (shift_name, start_minutes) = shift
                .map(|s| (s.name.clone(), s.start_minutes))
                .unwrap_or_else(|| (a.shift_id.clone(), 0));

            let (employee_name, role) = match snapshot.employee(&a.employee_id) {
                Some(emp) => (emp.name.clone(), emp.role.to_string()),
                None => (a.employee_id.clone(), UNKNOWN_ROLE.to_string()),
            };

            (
                EnrichedAssignment {
                    employee_id: a.employee_id.clone(),
                    employee_name,
                    role,
                    date: a.date,
                    shift_id: a.shift_id.clone(),
                    shift_name,
                    hours: a.hours,
                    cost: a.cost,
                },
                start_minutes,
            )
        })
        .collect();

    rows.sort_by(|(a, a_start), (b, b_start)| {
        a.date
            .cmp(&b.date)
            .then(a_start.cmp(b_start))
            .then(a.role.cmp(&b.role))
            .then(a.employee_name.cmp(&b.employee_name))
    });

    rows.into_iter().map(|(row, _)| row).collect()
}
