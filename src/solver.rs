//! Solver driver (C4, spec §4.5).
//!
//! Wraps the external MILP backend, enforces the time limit, extracts
//! assignment values, and on infeasibility computes an Irreducible
//! Infeasible Subsystem and classifies its constraint tags into the
//! families spec §4.5/§7/§8 describe.
//!
//! Grounded on `other_examples/22b6b52e_lissahyacinth-growth-rs__
//! growthrs-src-optimiser.rs.rs`'s `good_lp` + HiGHS usage. `good_lp`'s
//! `highs` binding has no turnkey IIS extraction call, so the IIS is
//! computed driver-side with the classical deletion-filter algorithm
//! (DESIGN.md): the MILP solve itself stays exact throughout, only the
//! *search for the minimal infeasible subset* is iterative.

use std::time::{Duration, Instant};

use chrono::{Datelike, Duration as ChronoDuration, Weekday};
use good_lp::solvers::highs::highs;
use good_lp::{ResolutionError, Solution, SolverModel};

use crate::error::SolveStage;
use crate::model::{Model, TaggedConstraint, JUNIOR_TAG, SENIOR_TAG};
use crate::registry::RawAssignment;

const MAX_BACKEND_RETRIES: u32 = 3;
const IIS_TIME_LIMIT_SECS: u32 = 30;
const ROUND_THRESHOLD: f64 = 0.5;

/// A fully extracted, rounding-validated solve result.
#[derive(Debug, Clone)]
pub struct SolvedValues {
    pub objective_value: f64,
    pub assignments: Vec<RawAssignment>,
    pub coverage_shortfall: f64,
}

/// One classified IIS conflict family (spec §4.5, §7, §8).
#[derive(Debug, Clone)]
pub struct Conflict {
    pub family: String,
    pub message: String,
    pub tags: Vec<String>,
}

/// The outcome of driving the backend to completion (spec §4.5).
#[derive(Debug, Clone)]
pub enum Termination {
    Optimal(SolvedValues),
    Feasible(SolvedValues),
    Infeasible(Vec<Conflict>),
    BackendError { stage: SolveStage, message: String },
}

/// Backend contract spec §4.5 assumes of the external collaborator.
pub trait MilpBackend: Send + Sync {
    fn solve(&self, model: &Model, penalty_uncovered: f64, time_limit_secs: u32) -> Termination;
}

/// `good_lp` + HiGHS backend.
pub struct HighsBackend;

impl MilpBackend for HighsBackend {
    fn solve(&self, model: &Model, penalty_uncovered: f64, time_limit_secs: u32) -> Termination {
        let (result, elapsed) =
            match solve_with_retry(model, &model.constraints, time_limit_secs, MAX_BACKEND_RETRIES) {
                Ok(pair) => pair,
                Err(message) => {
                    return Termination::BackendError {
                        stage: SolveStage::Solve,
                        message,
                    }
                }
            };

        match result {
            Ok(solution) => {
                let values = extract(model, &solution, penalty_uncovered);
                match validate(model, &values.assignments) {
                    Ok(()) => {
                        if elapsed.as_secs_f64() >= time_limit_secs as f64 * 0.95 {
                            Termination::Feasible(values)
                        } else {
                            Termination::Optimal(values)
                        }
                    }
                    Err(diagnostic) => Termination::BackendError {
                        stage: SolveStage::Extract,
                        message: diagnostic,
                    },
                }
            }
            Err(ResolutionError::Infeasible) => {
                let iis_tags = compute_iis(model, IIS_TIME_LIMIT_SECS);
                Termination::Infeasible(classify_conflicts(&iis_tags))
            }
            Err(ResolutionError::Unbounded) => Termination::BackendError {
                stage: SolveStage::Solve,
                message: "model unbounded".to_string(),
            },
            Err(other) => Termination::BackendError {
                stage: SolveStage::Solve,
                message: other.to_string(),
            },
        }
    }
}

/// Solves the full constraint set, retrying transient backend failures with
/// exponential backoff (spec §7). `Infeasible`/`Unbounded` are never
/// retried: they are legitimate termination codes, not connectivity
/// failures.
fn solve_with_retry(
    model: &Model,
    constraints: &[TaggedConstraint],
    time_limit_secs: u32,
    max_attempts: u32,
) -> Result<(Result<impl Solution, ResolutionError>, Duration), String> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let started = Instant::now();
        let result = solve_once(model, constraints, time_limit_secs);
        let elapsed = started.elapsed();
        match &result {
            Err(ResolutionError::Infeasible) | Err(ResolutionError::Unbounded) | Ok(_) => {
                return Ok((result, elapsed));
            }
            Err(_) if attempt >= max_attempts => {
                return Err(result.err().map(|e| e.to_string()).unwrap_or_default());
            }
            Err(_) => {
                std::thread::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1)));
            }
        }
    }
}

fn solve_once(
    model: &Model,
    constraints: &[TaggedConstraint],
    time_limit_secs: u32,
) -> Result<impl Solution, ResolutionError> {
    let mut problem = model
        .variables
        .clone()
        .minimise(model.objective.clone())
        .using(highs)
        .set_time_limit(time_limit_secs as f64);
    for tc in constraints {
        problem = problem.with(tc.constraint.clone());
    }
    problem.solve()
}

/// Deletion-filter IIS: a constraint is dropped from the candidate set
/// permanently once the remainder is still proven infeasible without it;
/// otherwise it is irreducible and kept. Terminates with a minimal
/// (irreducible) infeasible subsystem (GLOSSARY "IIS").
fn compute_iis(model: &Model, time_limit_secs: u32) -> Vec<String> {
    let mut candidates: Vec<TaggedConstraint> = model.constraints.clone();
    let tags_in_order: Vec<String> = model.constraints.iter().map(|c| c.tag.clone()).collect();

    for tag in &tags_in_order {
        let Some(pos) = candidates.iter().position(|c| &c.tag == tag) else {
            continue;
        };
        let mut trial = candidates.clone();
        trial.remove(pos);
        if let Err(ResolutionError::Infeasible) = solve_once(model, &trial, time_limit_secs) {
            candidates = trial; // still infeasible without it: not needed
        }
        // else: removing it restored feasibility (or errored/unbounded);
        // this constraint is part of the IIS, so it stays in `candidates`.
    }

    candidates.into_iter().map(|c| c.tag).collect()
}

fn family_of(tag: &str) -> &str {
    tag.split('[').next().unwrap_or(tag)
}

/// Maps every IIS constraint tag to exactly one conflict family and produces
/// a human-readable message per family (spec §4.5, §8 "IIS attribution").
fn classify_conflicts(iis_tags: &[String]) -> Vec<Conflict> {
    use std::collections::BTreeMap;

    let mut by_family: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for tag in iis_tags {
        by_family.entry(family_of(tag)).or_default().push(tag.clone());
    }

    let mut conflicts = Vec::new();

    if let Some(tags) = by_family.remove("cover") {
        let items: Vec<String> = tags.iter().map(|t| format_tuple(t, "cover[")).collect();
        conflicts.push(Conflict {
            family: "cover".to_string(),
            message: format!("insufficient staffing capacity on [{}]", items.join(", ")),
            tags,
        });
    }

    let rest_hours_tags: Vec<String> = ["forbidden_pair", "weekly_hours"]
        .iter()
        .filter_map(|f| by_family.remove(f))
        .flatten()
        .collect();
    if !rest_hours_tags.is_empty() {
        conflicts.push(Conflict {
            family: "forbidden_pair".to_string(),
            message: "rest/hours conflict".to_string(),
            tags: rest_hours_tags,
        });
    }

    if let Some(tags) = by_family.remove("skill_ratio") {
        let items: Vec<String> = tags.iter().map(|t| format_tuple(t, "skill_ratio[")).collect();
        conflicts.push(Conflict {
            family: "skill_ratio".to_string(),
            message: format!("seniority imbalance on [{}]", items.join(", ")),
            tags,
        });
    }

    for (family, tags) in by_family {
        conflicts.push(Conflict {
            family: family.to_string(),
            message: format!("conflict involving {family} constraints"),
            tags,
        });
    }

    conflicts
}

/// Renders `family[a|b|c]` as `(a, b, c)` for a human-readable message.
fn format_tuple(tag: &str, prefix: &str) -> String {
    let inner = match tag.strip_prefix(prefix).and_then(|s| s.strip_suffix(']')) {
        Some(inner) => inner,
        None => return tag.to_string(),
    };
    format!("({})", inner.split('|').collect::<Vec<_>>().join(", "))
}

fn extract(model: &Model, solution: &impl Solution, penalty_uncovered: f64) -> SolvedValues {
    let mut assignments = Vec::new();
    for (&(ei, t, si), &var) in &model.x {
        if solution.value(var) > ROUND_THRESHOLD {
            let emp = &model.employees[ei];
            let shift = &model.shifts[si];
            let hours = shift.length_hours();
            assignments.push(RawAssignment {
                employee_id: emp.employee_id.clone(),
                date: model.date_of(t),
                shift_id: shift.shift_id.clone(),
                hours,
                cost: emp.hourly_cost * hours,
            });
        }
    }
    assignments.sort_by(|a, b| (a.date, a.employee_id.clone()).cmp(&(b.date, b.employee_id.clone())));

    let coverage_shortfall: f64 = model.y.values().map(|&var| solution.value(var).max(0.0)).sum();

    let objective_value =
        assignments.iter().map(|a| a.cost).sum::<f64>() + coverage_shortfall * penalty_uncovered;

    SolvedValues {
        objective_value,
        assignments,
        coverage_shortfall,
    }
}

/// Re-derives every hard constraint family directly from domain semantics
/// and checks the rounded assignment list against them (spec §4.5
/// "extraction tolerates float noise ... validating the rounded solution
/// against each constraint tag"). Keeping this independent of `good_lp`'s
/// internal `Constraint` representation makes it a genuine second opinion on
/// the rounded solution, not a replay of the same arithmetic the solver
/// already did. Covers `one_per_day`, `forbidden_pair`, `consec_days`,
/// `night_cap`, `weekend_link`, and `skill_ratio` — the same six families
/// `model.rs::build_model` encodes as hard constraints (`weekly_hours` and
/// `min_shifts` are bounds on sums the solver itself already enforces exactly
/// via LP arithmetic, so rounding cannot silently violate them the way a
/// pairwise or windowed constraint can).
fn validate(model: &Model, assignments: &[RawAssignment]) -> Result<(), String> {
    let mut violations = Vec::new();
    const EPSILON: f64 = 1e-6;

    for emp in &model.employees {
        let mut by_date: Vec<&RawAssignment> = assignments
            .iter()
            .filter(|a| a.employee_id == emp.employee_id)
            .collect();
        by_date.sort_by_key(|a| a.date);

        let mut seen = std::collections::HashSet::new();
        for a in &by_date {
            if !seen.insert(a.date) {
                violations.push(format!("one_per_day violated for {} on {}", emp.employee_id, a.date));
            }
        }

        for pair in by_date.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if (b.date - a.date).num_days() != 1 {
                continue;
            }
            let s1 = model.shifts.iter().find(|s| s.shift_id == a.shift_id);
            let s2 = model.shifts.iter().find(|s| s.shift_id == b.shift_id);
            if let (Some(s1), Some(s2)) = (s1, s2) {
                let gap = s1.rest_gap_hours_to_next_day(s2);
                if gap < model.min_rest_hours - EPSILON {
                    violations.push(format!(
                        "forbidden_pair violated for {} between {} and {} (rest gap {}h < required {}h)",
                        emp.employee_id, a.date, b.date, gap, model.min_rest_hours
                    ));
                }
            }
        }

        let max_consec = model.max_consecutive_days;
        if model.horizon_days - 1 >= max_consec {
            for t in 0..=(model.horizon_days - 1 - max_consec) {
                let window_start = model.date_of(t);
                let window_end = model.date_of(t + max_consec);
                let worked = by_date
                    .iter()
                    .filter(|a| a.date >= window_start && a.date <= window_end)
                    .count() as i64;
                if worked > max_consec {
                    violations.push(format!(
                        "consec_days violated for {} in window {}..{} ({worked} > {max_consec})",
                        emp.employee_id, window_start, window_end
                    ));
                }
            }
        }

        let nights = by_date
            .iter()
            .filter_map(|a| model.shifts.iter().find(|s| s.shift_id == a.shift_id))
            .filter(|s| model.config.is_night(s))
            .count() as i64;
        if nights > model.max_night_shifts {
            violations.push(format!(
                "night_cap violated for {} ({nights} > {})",
                emp.employee_id, model.max_night_shifts
            ));
        }

        if model.require_complete_weekends {
            for t in 0..model.horizon_days {
                let date = model.date_of(t);
                if date.weekday() != Weekday::Sat || t + 1 >= model.horizon_days {
                    continue;
                }
                let sunday = date + ChronoDuration::days(1);
                let worked_sat = by_date.iter().any(|a| a.date == date);
                let worked_sun = by_date.iter().any(|a| a.date == sunday);
                if worked_sat != worked_sun {
                    violations.push(format!(
                        "weekend_link violated for {} on {date}/{sunday}",
                        emp.employee_id
                    ));
                }
            }
        }
    }

    for t in 0..model.horizon_days {
        let date = model.date_of(t);
        for shift in &model.shifts {
            if !model.config.is_critical(shift) {
                continue;
            }
            let on_shift: Vec<&RawAssignment> = assignments
                .iter()
                .filter(|a| a.date == date && a.shift_id == shift.shift_id)
                .collect();
            let senior = on_shift
                .iter()
                .filter(|a| model.employees.iter().any(|e| e.employee_id == a.employee_id && e.has_skill(SENIOR_TAG)))
                .count();
            let junior = on_shift
                .iter()
                .filter(|a| model.employees.iter().any(|e| e.employee_id == a.employee_id && e.has_skill(JUNIOR_TAG)))
                .count();
            if senior < junior {
                violations.push(format!(
                    "skill_ratio violated on {date}|{} (senior {senior} < junior {junior})",
                    shift.shift_id
                ));
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.join("; "))
    }
}

#[allow(dead_code)]
fn week_of(date: chrono::NaiveDate) -> u32 {
    date.iso_week().week()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, Employee, Role, Shift};
    use crate::model::{build_model, ModelConfig};
    use crate::request::ScheduleRequest;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn employee(id: &str, skills: &[&str]) -> Employee {
        Employee {
            employee_id: id.into(),
            name: id.into(),
            role: Role::Nurse,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            hourly_cost: 50.0,
            max_weekly_hours: 40.0,
        }
    }

    fn shift(id: &str, start: u32, end: u32) -> Shift {
        Shift {
            shift_id: id.into(),
            name: id.into(),
            start_minutes: start,
            end_minutes: end,
        }
    }

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            horizon_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            horizon_days: 7,
            solver_time_limit_secs: 30,
            allow_uncovered_demand: false,
            penalty_uncovered: 0.0,
            preference_weight: 0.0,
            max_consecutive_days: 3,
            min_rest_hours: 10.0,
            max_night_shifts: 1,
            min_shifts_per_employee: 0,
            require_complete_weekends: true,
        }
    }

    fn raw(employee_id: &str, day: i64, shift_id: &str, hours: f64) -> RawAssignment {
        RawAssignment {
            employee_id: employee_id.into(),
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap() + ChronoDuration::days(day),
            shift_id: shift_id.into(),
            hours,
            cost: hours * 50.0,
        }
    }

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot {
            employees: vec![
                employee("E1", &["RN", "Senior"]),
                employee("E2", &["RN", "Junior"]),
            ],
            shifts: vec![
                shift("S1", 7 * 60, 15 * 60),
                shift("S3", 23 * 60, 7 * 60),
            ],
            demand: vec![],
        }
    }

    #[test]
    fn validate_accepts_an_empty_solution() {
        let (model, _) = build_model(&snapshot(), &request(), &ModelConfig::default());
        assert!(validate(&model, &[]).is_ok());
    }

    #[test]
    fn validate_catches_a_rest_gap_shorter_than_required() {
        let (model, _) = build_model(&snapshot(), &request(), &ModelConfig::default());
        // Night (ends 07:00) then Morning next day (starts 07:00): 0h gap < 10h required.
        let assignments = vec![raw("E1", 0, "S3", 8.0), raw("E1", 1, "S1", 8.0)];
        let err = validate(&model, &assignments).unwrap_err();
        assert!(err.contains("forbidden_pair"));
    }

    #[test]
    fn validate_catches_too_many_consecutive_days() {
        let mut req = request();
        req.max_consecutive_days = 2;
        req.min_rest_hours = 0.0;
        let (model, _) = build_model(&snapshot(), &req, &ModelConfig::default());
        let assignments = vec![raw("E1", 0, "S1", 8.0), raw("E1", 1, "S1", 8.0), raw("E1", 2, "S1", 8.0)];
        let err = validate(&model, &assignments).unwrap_err();
        assert!(err.contains("consec_days"));
    }

    #[test]
    fn validate_catches_too_many_night_shifts() {
        let mut req = request();
        req.min_rest_hours = 0.0;
        req.max_night_shifts = 1;
        let (model, _) = build_model(&snapshot(), &req, &ModelConfig::default());
        let assignments = vec![raw("E1", 0, "S3", 8.0), raw("E1", 3, "S3", 8.0)];
        let err = validate(&model, &assignments).unwrap_err();
        assert!(err.contains("night_cap"));
    }

    #[test]
    fn validate_catches_an_incomplete_worked_weekend() {
        let mut req = request();
        req.min_rest_hours = 0.0;
        req.require_complete_weekends = true;
        let (model, _) = build_model(&snapshot(), &req, &ModelConfig::default());
        // 2025-12-06 is a Saturday; day offset 5. Working it without the
        // following Sunday (offset 6) violates weekend_link.
        let assignments = vec![raw("E1", 5, "S1", 8.0)];
        let err = validate(&model, &assignments).unwrap_err();
        assert!(err.contains("weekend_link"));
    }

    #[test]
    fn validate_catches_a_junior_heavy_critical_shift() {
        let mut req = request();
        req.min_rest_hours = 0.0;
        req.require_complete_weekends = false;
        let mut config = ModelConfig::default();
        config.critical_shift_ids = Some(HashSet::from(["S1".to_string()]));
        let (model, _) = build_model(&snapshot(), &req, &config);
        let assignments = vec![raw("E2", 0, "S1", 8.0)];
        let err = validate(&model, &assignments).unwrap_err();
        assert!(err.contains("skill_ratio"));
    }

    #[test]
    fn family_of_strips_params() {
        assert_eq!(family_of("cover[2025-12-01|S1|RN]"), "cover");
        assert_eq!(family_of("forbidden_pair[E1|2025-12-01|S3|S1]"), "forbidden_pair");
    }

    #[test]
    fn cover_tuple_formats_literal_message_shape() {
        assert_eq!(format_tuple("cover[2025-12-01|S1|RN]", "cover["), "(2025-12-01, S1, RN)");
    }

    #[test]
    fn classify_coverage_only_iis() {
        let tags = vec!["cover[2025-12-01|S1|RN]".to_string()];
        let conflicts = classify_conflicts(&tags);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].family, "cover");
        assert!(conflicts[0].message.contains("insufficient staffing capacity"));
        assert!(conflicts[0].message.contains("(2025-12-01, S1, RN)"));
    }

    #[test]
    fn classify_rest_hours_iis() {
        let tags = vec!["forbidden_pair[E3|2025-12-01|S3|S1]".to_string()];
        let conflicts = classify_conflicts(&tags);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].message, "rest/hours conflict");
    }

    #[test]
    fn classify_skill_ratio_iis() {
        let tags = vec!["skill_ratio[2025-12-01|S3]".to_string()];
        let conflicts = classify_conflicts(&tags);
        assert_eq!(conflicts[0].family, "skill_ratio");
        assert!(conflicts[0].message.contains("seniority imbalance"));
    }

    #[test]
    fn classify_generic_family_falls_back() {
        let tags = vec!["night_cap[E1]".to_string()];
        let conflicts = classify_conflicts(&tags);
        assert_eq!(conflicts[0].family, "night_cap");
        assert!(conflicts[0].message.contains("night_cap"));
    }

    #[test]
    fn every_family_maps_to_exactly_one_conflict_group() {
        let tags = vec![
            "cover[2025-12-01|S1|RN]".to_string(),
            "one_per_day[E1|2025-12-01]".to_string(),
            "weekly_hours[E1|49]".to_string(),
            "forbidden_pair[E1|2025-12-01|S3|S1]".to_string(),
            "consec_days[E1|2025-12-01]".to_string(),
            "skill_ratio[2025-12-01|S3]".to_string(),
            "night_cap[E1]".to_string(),
            "min_shifts[E1]".to_string(),
            "weekend_link[E1|2025-12-06]".to_string(),
        ];
        let conflicts = classify_conflicts(&tags);
        let covered_tags: usize = conflicts.iter().map(|c| c.tags.len()).sum();
        assert_eq!(covered_tags, tags.len());
    }
}
