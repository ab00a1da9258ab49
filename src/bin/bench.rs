//! Benchmark for end-to-end MILP solve time against the demo catalog.
//!
//! Run with: cargo run --release --bin bench

use std::time::Instant;

use chrono::NaiveDate;

use hospital_scheduler_core::catalog::{CatalogSnapshot, DemandRow};
use hospital_scheduler_core::demo_data;
use hospital_scheduler_core::model::{build_model, ModelConfig};
use hospital_scheduler_core::request::ScheduleRequest;
use hospital_scheduler_core::solver::{HighsBackend, MilpBackend, Termination};

fn main() {
    let snapshot = CatalogSnapshot {
        employees: demo_data::demo_employees(),
        shifts: demo_data::demo_shifts(),
        demand: demo_data::demo_demand()
            .into_iter()
            .enumerate()
            .map(|(id, (date, shift_id, skill, required))| DemandRow {
                id: id as u64,
                date,
                shift_id,
                skill,
                required,
            })
            .collect(),
    };

    let request = ScheduleRequest {
        horizon_start: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
        horizon_days: 14,
        solver_time_limit_secs: 60,
        allow_uncovered_demand: true,
        penalty_uncovered: 1000.0,
        preference_weight: 0.0,
        max_consecutive_days: 5,
        min_rest_hours: 11.0,
        max_night_shifts: 5,
        min_shifts_per_employee: 0,
        require_complete_weekends: false,
    };

    println!("Benchmark: MILP solve (good_lp + HiGHS)");
    println!("  Employees: {}", snapshot.employees.len());
    println!("  Shifts: {}", snapshot.shifts.len());
    println!("  Demand rows: {}", snapshot.demand.len());
    println!("  Horizon days: {}", request.horizon_days);
    println!();

    let build_start = Instant::now();
    let (model, warnings) = build_model(&snapshot, &request, &ModelConfig::default());
    println!("Model build: {:?} ({} constraints)", build_start.elapsed(), model.constraints.len());
    for warning in &warnings {
        println!("  warning: {warning}");
    }

    let solve_start = Instant::now();
    let backend = HighsBackend;
    let termination = backend.solve(&model, request.penalty_uncovered, request.solver_time_limit_secs);
    let elapsed = solve_start.elapsed();

    match termination {
        Termination::Optimal(values) => {
            println!("OPTIMAL in {elapsed:?}: objective={:.2}, assignments={}", values.objective_value, values.assignments.len());
        }
        Termination::Feasible(values) => {
            println!("FEASIBLE (time limit reached) in {elapsed:?}: objective={:.2}", values.objective_value);
        }
        Termination::Infeasible(conflicts) => {
            println!("INFEASIBLE in {elapsed:?}:");
            for conflict in conflicts {
                println!("  {}: {}", conflict.family, conflict.message);
            }
        }
        Termination::BackendError { stage, message } => {
            println!("ERROR in {elapsed:?} at {stage}: {message}");
        }
    }
}
