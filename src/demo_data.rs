//! Demo catalog generator (spec §6 "seed").
//!
//! Grounded on the teacher's seeded `StdRng` generator (`demo_data.rs`):
//! deterministic output from a fixed seed, built up from small parameter
//! tables rather than hand-listed literals. The roster is anchored on the
//! exact employee/shift catalog spec §8 uses for its worked scenarios
//! (`E1`/`E2`/`E3`, `S1`/`S2`/`S3`), so requesting the 2025-12-01 7-day
//! horizon against a freshly seeded catalog reproduces them, and then
//! extended with a few more names and two weeks of randomized demand so the
//! demo is not just the three-employee textbook example.

use chrono::{Duration, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use crate::catalog::{Employee, Role, Shift};

const SEED: u64 = 42;
const DEMO_HORIZON_START: &str = "2025-12-01";
const DEMO_HORIZON_DAYS: i64 = 14;

pub fn demo_employees() -> Vec<Employee> {
    vec![
        Employee {
            employee_id: "E1".into(),
            name: "Dr. Amara Okafor".into(),
            role: Role::Doctor,
            skills: skillset(&["MD"]),
            hourly_cost: 150.0,
            max_weekly_hours: 40.0,
        },
        Employee {
            employee_id: "E2".into(),
            name: "Priya Sundaram".into(),
            role: Role::Nurse,
            skills: skillset(&["RN", "ICU", "Senior"]),
            hourly_cost: 55.0,
            max_weekly_hours: 48.0,
        },
        Employee {
            employee_id: "E3".into(),
            name: "Jonah Whitfield".into(),
            role: Role::Nurse,
            skills: skillset(&["RN", "Junior"]),
            hourly_cost: 50.0,
            max_weekly_hours: 40.0,
        },
        Employee {
            employee_id: "E4".into(),
            name: "Dr. Lucas Bergström".into(),
            role: Role::Doctor,
            skills: skillset(&["MD"]),
            hourly_cost: 145.0,
            max_weekly_hours: 40.0,
        },
        Employee {
            employee_id: "E5".into(),
            name: "Noor Haddad".into(),
            role: Role::Nurse,
            skills: skillset(&["RN", "ICU", "Senior"]),
            hourly_cost: 58.0,
            max_weekly_hours: 48.0,
        },
        Employee {
            employee_id: "E6".into(),
            name: "Mei Lin Tan".into(),
            role: Role::Nurse,
            skills: skillset(&["RN", "Junior"]),
            hourly_cost: 48.0,
            max_weekly_hours: 40.0,
        },
        Employee {
            employee_id: "E7".into(),
            name: "Rafael Souza".into(),
            role: Role::Nurse,
            skills: skillset(&["RN", "Junior"]),
            hourly_cost: 49.0,
            max_weekly_hours: 40.0,
        },
    ]
}

pub fn demo_shifts() -> Vec<Shift> {
    vec![
        Shift {
            shift_id: "S1".into(),
            name: "Morning".into(),
            start_minutes: 7 * 60,
            end_minutes: 15 * 60,
        },
        Shift {
            shift_id: "S2".into(),
            name: "Afternoon".into(),
            start_minutes: 15 * 60,
            end_minutes: 23 * 60,
        },
        Shift {
            shift_id: "S3".into(),
            name: "Night".into(),
            start_minutes: 23 * 60,
            end_minutes: 7 * 60,
        },
    ]
}

/// (date, shift_id, skill, required) rows, matching
/// [`crate::catalog::CatalogRepository::upsert_demand`]'s argument order.
pub fn demo_demand() -> Vec<(NaiveDate, String, String, u32)> {
    let mut rng = StdRng::seed_from_u64(SEED);
    let start = NaiveDate::parse_from_str(DEMO_HORIZON_START, "%Y-%m-%d").expect("valid literal date");

    // Baseline skill/shift demand pattern per day, lightly perturbed per day
    // so the demo isn't perfectly periodic.
    let pattern: [(&str, &str, u32); 4] = [("S1", "RN", 2), ("S1", "MD", 1), ("S2", "RN", 1), ("S3", "RN", 1)];

    let mut rows = Vec::new();
    for day in 0..DEMO_HORIZON_DAYS {
        let date = start + Duration::days(day);
        for (shift_id, skill, base_required) in pattern {
            let jitter: i32 = rng.gen_range(-1..=1);
            let required = (base_required as i32 + jitter).max(1) as u32;
            rows.push((date, shift_id.to_string(), skill.to_string(), required));
        }
    }
    rows
}

fn skillset(skills: &[&str]) -> HashSet<String> {
    skills.iter().map(|s| s.to_string()).collect()
}
