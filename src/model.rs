//! Model builder (C3, spec §4.4).
//!
//! Pure function: `(catalog snapshot, request, config) -> MILP`. Every
//! constraint carries a stable, human-readable tag of the shape
//! `family[params]`; [`crate::solver`] uses these tags to attribute an
//! Irreducible Infeasible Subsystem back to a constraint family (spec §4.5,
//! §8 "IIS attribution").
//!
//! Grounded on the teacher's `constraints.rs` (one function per named
//! constraint family, assembled into a single set) and on `good_lp`'s
//! `ProblemVariables`/`constraint!` idiom (`other_examples/
//! 22b6b52e_lissahyacinth-growth-rs__growthrs-src-optimiser.rs.rs`).

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use good_lp::{constraint, variable, Constraint, Expression, ProblemVariables, Variable};

use crate::catalog::{CatalogSnapshot, Employee, Shift};
use crate::interning::{Interner, Token};
use crate::request::ScheduleRequest;

pub(crate) const SENIOR_TAG: &str = "Senior";
pub(crate) const JUNIOR_TAG: &str = "Junior";

/// Construction-time knobs not carried on [`ScheduleRequest`] itself: the
/// critical-shift set for the seniority ratio (spec §4.4 family 6) and the
/// night-shift window (spec §4.4 "Night-shift classification"). Both default
/// to the values the core documents; both are overridable per spec's
/// "Configurable at construction" note.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Shift ids treated as seniority-ratio-critical. `None` falls back to
    /// "shift name contains an ICU-like marker" (case-insensitive).
    pub critical_shift_ids: Option<HashSet<String>>,
    pub night_start_minutes: u32,
    pub night_end_minutes: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            critical_shift_ids: None,
            night_start_minutes: 20 * 60,
            night_end_minutes: 6 * 60,
        }
    }
}

impl ModelConfig {
    pub(crate) fn is_critical(&self, shift: &Shift) -> bool {
        match &self.critical_shift_ids {
            Some(ids) => ids.contains(&shift.shift_id),
            None => shift.name.to_uppercase().contains("ICU"),
        }
    }

    pub(crate) fn is_night(&self, shift: &Shift) -> bool {
        shift.start_minutes >= self.night_start_minutes || shift.start_minutes < self.night_end_minutes
    }
}

/// A single named constraint plus the `good_lp` constraint it produced.
/// Removable independently so [`crate::solver`] can run the deletion-filter
/// IIS algorithm over the constraint set.
#[derive(Clone)]
pub struct TaggedConstraint {
    pub tag: String,
    pub constraint: Constraint,
}

/// The assembled MILP plus enough bookkeeping to extract a solution back
/// into [`crate::registry::RawAssignment`] rows.
pub struct Model {
    pub variables: ProblemVariables,
    pub objective: Expression,
    pub constraints: Vec<TaggedConstraint>,
    /// (employee index, day offset, shift index) -> binary assignment variable.
    pub x: HashMap<(usize, i64, usize), Variable>,
    /// (day offset, shift index, skill) -> continuous shortfall variable.
    /// Empty when `allow_uncovered_demand` is false (spec §4.4).
    pub y: HashMap<(i64, usize, String), Variable>,
    pub employees: Vec<Employee>,
    pub shifts: Vec<Shift>,
    pub horizon_start: NaiveDate,
    pub horizon_days: i64,
    /// Construction-time knobs (critical-shift set, night window), carried
    /// alongside the model so a later validation pass can re-derive the same
    /// night/critical classification the builder used.
    pub config: ModelConfig,
    /// Request-level hard-constraint knobs, copied onto the model so
    /// [`crate::solver`]'s rounded-solution validation can re-check every
    /// hard family (spec §4.5) without threading the original request
    /// through the solve pipeline.
    pub min_rest_hours: f64,
    pub max_consecutive_days: i64,
    pub max_night_shifts: i64,
    pub require_complete_weekends: bool,
}

impl Model {
    pub fn date_of(&self, day_offset: i64) -> NaiveDate {
        self.horizon_start + Duration::days(day_offset)
    }
}

/// Builds the MILP for one snapshot/request pair. Deterministic: identical
/// inputs produce identical variables, objective, and constraint tags modulo
/// stable ordering (spec §8 "Deterministic builder").
///
/// Returns the model plus any non-fatal warnings (currently: the
/// `min_shifts_per_employee` downshift, spec §4.4 item 8), which the caller
/// appends to the run log.
pub fn build_model(
    snapshot: &CatalogSnapshot,
    request: &ScheduleRequest,
    config: &ModelConfig,
) -> (Model, Vec<String>) {
    let mut warnings = Vec::new();
    let mut vars = ProblemVariables::new();

    let mut employees = snapshot.employees.clone();
    employees.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
    let mut shifts = snapshot.shifts.clone();
    shifts.sort_by(|a, b| a.shift_id.cmp(&b.shift_id));

    // C8: intern every skill token in the snapshot once, then precompute each
    // employee's skill set as `Token`s so the constraint loops below compare
    // tokens rather than re-hashing strings per row (spec §9, §4.4).
    let interner: Interner = snapshot.intern_skills();
    let employee_tokens: Vec<HashSet<Token>> = employees
        .iter()
        .map(|emp| emp.skills.iter().filter_map(|s| interner.get(s)).collect())
        .collect();
    let senior_token = interner.get(SENIOR_TAG);
    let junior_token = interner.get(JUNIOR_TAG);

    let horizon_days = request.horizon_days;
    let horizon_start = request.horizon_start;

    // --- decision variables -------------------------------------------------
    let mut x: HashMap<(usize, i64, usize), Variable> = HashMap::new();
    for (ei, emp) in employees.iter().enumerate() {
        for t in 0..horizon_days {
            for (si, shift) in shifts.iter().enumerate() {
                let v = vars.add(
                    variable()
                        .binary()
                        .name(format!("x_{}_{}_{}", emp.employee_id, t, shift.shift_id)),
                );
                x.insert((ei, t, si), v);
            }
        }
    }

    // Demand rows keyed by (day offset, shift index, skill), deduplicated —
    // a demand row is keyed by (date, shift_id, skill) per spec §3.
    let mut demand_keys: Vec<(i64, usize, String, u32)> = Vec::new();
    for row in &snapshot.demand {
        let day_offset = (row.date - horizon_start).num_days();
        if day_offset < 0 || day_offset >= horizon_days {
            continue;
        }
        let Some(si) = shifts.iter().position(|s| s.shift_id == row.shift_id) else {
            continue;
        };
        demand_keys.push((day_offset, si, row.skill.clone(), row.required));
    }
    demand_keys.sort_by(|a, b| (a.0, a.1, a.2.clone()).cmp(&(b.0, b.1, b.2.clone())));

    let mut y: HashMap<(i64, usize, String), Variable> = HashMap::new();
    if request.allow_uncovered_demand {
        for (day_offset, si, skill, _required) in &demand_keys {
            let shift = &shifts[*si];
            let v = vars.add(variable().min(0.0).name(format!(
                "y_{}_{}_{}",
                day_offset, shift.shift_id, skill
            )));
            y.insert((*day_offset, *si, skill.clone()), v);
        }
    }

    // --- objective ------------------------------------------------------------
    // W_cost=1, W_cover=penalty_uncovered, W_pref=weight_preference (spec §4.4).
    // The Avoid set is always empty in this core (spec §9 open question), so
    // the W_pref term has no surviving variables to sum over.
    let mut objective = Expression::from(0.0);
    for (ei, emp) in employees.iter().enumerate() {
        for t in 0..horizon_days {
            for (si, shift) in shifts.iter().enumerate() {
                let coeff = emp.hourly_cost * shift.length_hours();
                objective += x[&(ei, t, si)] * coeff;
            }
        }
    }
    if request.allow_uncovered_demand {
        for v in y.values() {
            objective += *v * request.penalty_uncovered;
        }
    }

    let mut constraints: Vec<TaggedConstraint> = Vec::new();

    // 1. cover[t,s,k]
    for (day_offset, si, skill, required) in &demand_keys {
        let shift = &shifts[*si];
        let date = horizon_start + Duration::days(*day_offset);
        let mut lhs: Expression = Expression::from(0.0);
        // Unknown token (a skill nobody holds and no demand interned, which
        // cannot happen since `skill` itself was interned from this same
        // demand row) would just match nobody; `get` never panics either way.
        let skill_token = interner.get(skill);
        for (ei, _emp) in employees.iter().enumerate() {
            if skill_token.is_some_and(|tok| employee_tokens[ei].contains(&tok)) {
                lhs += x[&(ei, *day_offset, *si)];
            }
        }
        let tag = format!("cover[{date}|{}|{skill}]", shift.shift_id);
        let c = if request.allow_uncovered_demand {
            let slack = y[&(*day_offset, *si, skill.clone())];
            constraint!(lhs + slack >= *required as f64)
        } else {
            constraint!(lhs >= *required as f64)
        };
        constraints.push(TaggedConstraint { tag, constraint: c });
    }

    // 2. one_per_day[e,t]
    for (ei, emp) in employees.iter().enumerate() {
        for t in 0..horizon_days {
            let date = horizon_start + Duration::days(t);
            let lhs: Expression = shifts.iter().enumerate().map(|(si, _)| x[&(ei, t, si)]).sum();
            let tag = format!("one_per_day[{}|{date}]", emp.employee_id);
            constraints.push(TaggedConstraint {
                tag,
                constraint: constraint!(lhs <= 1),
            });
        }
    }

    // 3. weekly_hours[e,w] — calendar weeks (Mon-Sun) intersecting the horizon.
    for (ei, emp) in employees.iter().enumerate() {
        for week_start_offset in week_starts(horizon_start, horizon_days) {
            let mut lhs: Expression = Expression::from(0.0);
            for t in week_start_offset..(week_start_offset + 7).min(horizon_days) {
                if t < 0 {
                    continue;
                }
                for (si, shift) in shifts.iter().enumerate() {
                    lhs += x[&(ei, t, si)] * shift.length_hours();
                }
            }
            let week_label = horizon_start + Duration::days(week_start_offset.max(0));
            let tag = format!("weekly_hours[{}|{}]", emp.employee_id, week_label.iso_week().week());
            constraints.push(TaggedConstraint {
                tag,
                constraint: constraint!(lhs <= emp.max_weekly_hours),
            });
        }
    }

    // 4. forbidden_pair[e,t,s1,s2] — min rest / forward rotation.
    for (ei, emp) in employees.iter().enumerate() {
        for t in 0..(horizon_days - 1) {
            for (s1i, s1) in shifts.iter().enumerate() {
                for (s2i, s2) in shifts.iter().enumerate() {
                    let gap = s1.rest_gap_hours_to_next_day(s2);
                    if gap < request.min_rest_hours {
                        let date = horizon_start + Duration::days(t);
                        let tag = format!(
                            "forbidden_pair[{}|{date}|{}|{}]",
                            emp.employee_id, s1.shift_id, s2.shift_id
                        );
                        let lhs = x[&(ei, t, s1i)] + x[&(ei, t + 1, s2i)];
                        constraints.push(TaggedConstraint {
                            tag,
                            constraint: constraint!(lhs <= 1),
                        });
                    }
                }
            }
        }
    }

    // 5. consec_days[e,t]
    let max_consec = request.max_consecutive_days;
    if horizon_days - 1 >= max_consec {
        for (ei, emp) in employees.iter().enumerate() {
            for t in 0..=(horizon_days - 1 - max_consec) {
                let mut lhs: Expression = Expression::from(0.0);
                for j in t..=(t + max_consec) {
                    for (si, _) in shifts.iter().enumerate() {
                        lhs += x[&(ei, j, si)];
                    }
                }
                let date = horizon_start + Duration::days(t);
                let tag = format!("consec_days[{}|{date}]", emp.employee_id);
                constraints.push(TaggedConstraint {
                    tag,
                    constraint: constraint!(lhs <= max_consec as f64),
                });
            }
        }
    }

    // 6. skill_ratio[t,s]
    for t in 0..horizon_days {
        let date = horizon_start + Duration::days(t);
        for (si, shift) in shifts.iter().enumerate() {
            if !config.is_critical(shift) {
                continue;
            }
            let mut senior: Expression = Expression::from(0.0);
            let mut junior: Expression = Expression::from(0.0);
            for (ei, _emp) in employees.iter().enumerate() {
                if senior_token.is_some_and(|tok| employee_tokens[ei].contains(&tok)) {
                    senior += x[&(ei, t, si)];
                }
                if junior_token.is_some_and(|tok| employee_tokens[ei].contains(&tok)) {
                    junior += x[&(ei, t, si)];
                }
            }
            let tag = format!("skill_ratio[{date}|{}]", shift.shift_id);
            constraints.push(TaggedConstraint {
                tag,
                constraint: constraint!(senior >= junior),
            });
        }
    }

    // 7. night_cap[e]
    for (ei, emp) in employees.iter().enumerate() {
        let mut lhs: Expression = Expression::from(0.0);
        for t in 0..horizon_days {
            for (si, shift) in shifts.iter().enumerate() {
                if config.is_night(shift) {
                    lhs += x[&(ei, t, si)];
                }
            }
        }
        let tag = format!("night_cap[{}]", emp.employee_id);
        constraints.push(TaggedConstraint {
            tag,
            constraint: constraint!(lhs <= request.max_night_shifts as f64),
        });
    }

    // 8. min_shifts[e] — hard, with graceful downshift (spec §4.4 item 8).
    let max_shift_length = shifts
        .iter()
        .map(|s| s.length_hours())
        .fold(0.0_f64, f64::max);
    for (ei, emp) in employees.iter().enumerate() {
        let mut bound = request.min_shifts_per_employee as f64;
        if max_shift_length > 0.0 {
            let feasible_bound = (emp.max_weekly_hours / max_shift_length).floor();
            if bound > feasible_bound {
                warnings.push(format!(
                    "min_shifts_per_employee downshifted for {} from {} to {} (max_weekly_hours={} / max_shift_length={})",
                    emp.employee_id, bound, feasible_bound, emp.max_weekly_hours, max_shift_length
                ));
                bound = feasible_bound;
            }
        }
        let mut lhs: Expression = Expression::from(0.0);
        for t in 0..horizon_days {
            for (si, _) in shifts.iter().enumerate() {
                lhs += x[&(ei, t, si)];
            }
        }
        let tag = format!("min_shifts[{}]", emp.employee_id);
        constraints.push(TaggedConstraint {
            tag,
            constraint: constraint!(lhs >= bound),
        });
    }

    // 9. weekend_link[e,w]
    if request.require_complete_weekends {
        for sat_offset in saturdays_with_following_sunday(horizon_start, horizon_days) {
            let sun_offset = sat_offset + 1;
            let sat_date = horizon_start + Duration::days(sat_offset);
            for (ei, emp) in employees.iter().enumerate() {
                let sat_sum: Expression = shifts.iter().enumerate().map(|(si, _)| x[&(ei, sat_offset, si)]).sum();
                let sun_sum: Expression = shifts.iter().enumerate().map(|(si, _)| x[&(ei, sun_offset, si)]).sum();
                let tag = format!("weekend_link[{}|{sat_date}]", emp.employee_id);
                constraints.push(TaggedConstraint {
                    tag,
                    constraint: constraint!(sat_sum == sun_sum),
                });
            }
        }
    }

    let model = Model {
        variables: vars,
        objective,
        constraints,
        x,
        y,
        employees,
        shifts,
        horizon_start,
        horizon_days,
        config: config.clone(),
        min_rest_hours: request.min_rest_hours,
        max_consecutive_days: request.max_consecutive_days,
        max_night_shifts: request.max_night_shifts,
        require_complete_weekends: request.require_complete_weekends,
    };

    (model, warnings)
}

/// Offsets (possibly negative) of the Monday that starts each calendar week
/// touching `[horizon_start, horizon_start + horizon_days)`.
fn week_starts(horizon_start: NaiveDate, horizon_days: i64) -> Vec<i64> {
    let days_since_monday = horizon_start.weekday().num_days_from_monday() as i64;
    let first_monday_offset = -days_since_monday;
    let mut starts = Vec::new();
    let mut offset = first_monday_offset;
    while offset < horizon_days {
        starts.push(offset);
        offset += 7;
    }
    starts
}

/// Day offsets of every Saturday in the horizon whose following Sunday is
/// also inside the horizon (spec §4.4 family 9: "fully inside the horizon").
fn saturdays_with_following_sunday(horizon_start: NaiveDate, horizon_days: i64) -> Vec<i64> {
    (0..horizon_days)
        .filter(|&t| {
            let date = horizon_start + Duration::days(t);
            date.weekday() == Weekday::Sat && t + 1 < horizon_days
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DemandRow, Role};
    use std::collections::HashSet;

    fn employee(id: &str, role: Role, skills: &[&str], cost: f64, max_weekly: f64) -> Employee {
        Employee {
            employee_id: id.into(),
            name: id.into(),
            role,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            hourly_cost: cost,
            max_weekly_hours: max_weekly,
        }
    }

    fn shift(id: &str, name: &str, start: u32, end: u32) -> Shift {
        Shift {
            shift_id: id.into(),
            name: name.into(),
            start_minutes: start,
            end_minutes: end,
        }
    }

    fn base_request() -> ScheduleRequest {
        ScheduleRequest {
            horizon_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            horizon_days: 7,
            solver_time_limit_secs: 30,
            allow_uncovered_demand: false,
            penalty_uncovered: 0.0,
            preference_weight: 0.0,
            max_consecutive_days: 3,
            min_rest_hours: 10.0,
            max_night_shifts: 5,
            min_shifts_per_employee: 0,
            require_complete_weekends: false,
        }
    }

    fn literal_catalog() -> CatalogSnapshot {
        CatalogSnapshot {
            employees: vec![
                employee("E1", Role::Doctor, &["MD"], 150.0, 40.0),
                employee("E2", Role::Nurse, &["RN", "ICU", "Senior"], 55.0, 48.0),
                employee("E3", Role::Nurse, &["RN", "Junior"], 50.0, 40.0),
            ],
            shifts: vec![
                shift("S1", "Morning", 7 * 60, 15 * 60),
                shift("S2", "Afternoon", 15 * 60, 23 * 60),
                shift("S3", "Night", 23 * 60, 7 * 60),
            ],
            demand: vec![],
        }
    }

    #[test]
    fn builder_is_deterministic() {
        let snapshot = literal_catalog();
        let request = base_request();
        let config = ModelConfig::default();
        let (m1, _) = build_model(&snapshot, &request, &config);
        let (m2, _) = build_model(&snapshot, &request, &config);
        let tags1: Vec<&str> = m1.constraints.iter().map(|c| c.tag.as_str()).collect();
        let tags2: Vec<&str> = m2.constraints.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags1, tags2);
    }

    #[test]
    fn cover_constraint_created_per_demand_row() {
        let mut snapshot = literal_catalog();
        snapshot.demand.push(DemandRow {
            id: 1,
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            shift_id: "S1".into(),
            skill: "RN".into(),
            required: 1,
        });
        let (model, _) = build_model(&snapshot, &base_request(), &ModelConfig::default());
        assert!(model
            .constraints
            .iter()
            .any(|c| c.tag.starts_with("cover[2025-12-01|S1|RN]")));
    }

    #[test]
    fn elastic_cover_creates_shortfall_variable() {
        let mut snapshot = literal_catalog();
        snapshot.demand.push(DemandRow {
            id: 1,
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            shift_id: "S1".into(),
            skill: "RN".into(),
            required: 3,
        });
        let mut request = base_request();
        request.allow_uncovered_demand = true;
        request.penalty_uncovered = 1000.0;
        let (model, _) = build_model(&snapshot, &request, &ModelConfig::default());
        assert_eq!(model.y.len(), 1);
    }

    #[test]
    fn forbidden_pair_binds_when_rest_too_short() {
        let snapshot = literal_catalog();
        let mut request = base_request();
        request.min_rest_hours = 10.0;
        let (model, _) = build_model(&snapshot, &request, &ModelConfig::default());
        // Night (ends 07:00) -> Morning next day (starts 07:00): 0h gap, forbidden.
        assert!(model
            .constraints
            .iter()
            .any(|c| c.tag.contains("forbidden_pair") && c.tag.contains("S3") && c.tag.contains("S1")));
    }

    #[test]
    fn skill_ratio_only_applies_to_critical_shifts() {
        let snapshot = literal_catalog(); // no shift named with ICU marker
        let (model, _) = build_model(&snapshot, &base_request(), &ModelConfig::default());
        assert!(!model.constraints.iter().any(|c| c.tag.starts_with("skill_ratio")));

        let mut config = ModelConfig::default();
        config.critical_shift_ids = Some(HashSet::from(["S3".to_string()]));
        let (model2, _) = build_model(&snapshot, &base_request(), &config);
        assert!(model2.constraints.iter().any(|c| c.tag.starts_with("skill_ratio[2025-12-01|S3]")));
    }

    #[test]
    fn cover_constraint_builds_even_when_no_employee_holds_the_demanded_skill() {
        // A demand row for a skill nobody in the snapshot holds still builds a
        // (trivially unsatisfiable) cover constraint rather than panicking on
        // an unresolved token lookup.
        let mut snapshot = literal_catalog();
        snapshot.demand.push(DemandRow {
            id: 1,
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            shift_id: "S1".into(),
            skill: "Pharmacist".into(),
            required: 1,
        });
        let (model, _) = build_model(&snapshot, &base_request(), &ModelConfig::default());
        assert!(model
            .constraints
            .iter()
            .any(|c| c.tag.starts_with("cover[2025-12-01|S1|Pharmacist]")));
    }

    #[test]
    fn skill_ratio_ignores_employees_without_a_seniority_tag() {
        // E1 (MD, no Senior/Junior tag) must not count toward either side of
        // the ratio even though it can be assigned the critical shift.
        let snapshot = literal_catalog();
        let mut config = ModelConfig::default();
        config.critical_shift_ids = Some(HashSet::from(["S3".to_string()]));
        let (model, _) = build_model(&snapshot, &base_request(), &config);
        assert!(model
            .constraints
            .iter()
            .any(|c| c.tag.starts_with("skill_ratio[2025-12-01|S3]")));
    }

    #[test]
    fn min_shifts_downshifts_when_infeasible_by_construction() {
        let snapshot = literal_catalog();
        let mut request = base_request();
        request.min_shifts_per_employee = 100;
        let (_, warnings) = build_model(&snapshot, &request, &ModelConfig::default());
        assert!(warnings.iter().any(|w| w.contains("downshifted")));
    }

    #[test]
    fn weekend_link_only_for_complete_weekend_pairs() {
        let snapshot = literal_catalog();
        let mut request = base_request();
        request.require_complete_weekends = true;
        let (model, _) = build_model(&snapshot, &request, &ModelConfig::default());
        // 2025-12-06 is a Saturday, 2025-12-07 a Sunday, both inside a 7-day
        // horizon starting 2025-12-01.
        assert!(model
            .constraints
            .iter()
            .any(|c| c.tag.starts_with("weekend_link") && c.tag.contains("2025-12-06")));
    }
}
