//! Catalog store (C1, spec §3 & §4.2).
//!
//! A persistent keyed collection of employees, shifts, and demand rows. The
//! CRUD surface is deliberately thin (spec §1 treats it as a straightforward
//! keyed store owned by an external collaborator); what this core needs from
//! it is point reads, a horizon-bounded demand scan, and a consistent
//! `snapshot()` the model builder can consume without racing catalog writers.
//!
//! Grounded on the local/postgres repository split in
//! `VPRamon-TSI/backend/src/db/repositories`: an `async_trait` so a real SQL
//! backend is a drop-in later, with one in-memory implementation here (engine
//! selection is out of scope per spec §1).

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::interning::Interner;

/// Closed set of employee roles (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Doctor,
    Nurse,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Doctor => "Doctor",
            Role::Nurse => "Nurse",
        })
    }
}

/// An employee, keyed by `employee_id` (opaque, unique across the catalog).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    pub role: Role,
    pub skills: HashSet<String>,
    pub hourly_cost: f64,
    pub max_weekly_hours: f64,
}

impl Employee {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.contains(skill)
    }
}

/// A shift, keyed by `shift_id`. Start/end are minutes-since-midnight; a
/// shift whose `end_minutes <= start_minutes` wraps past midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub shift_id: String,
    pub name: String,
    pub start_minutes: u32,
    pub end_minutes: u32,
}

const MINUTES_PER_DAY: i64 = 24 * 60;
const NIGHT_START_MINUTES: u32 = 20 * 60;
const NIGHT_END_MINUTES: u32 = 6 * 60;

impl Shift {
    /// Signed gap end-start folded into `[0, 1440)`, i.e. the minute length
    /// of the shift taking the modulo-24 wrap path (spec §3).
    fn length_minutes(&self) -> i64 {
        let start = self.start_minutes as i64;
        let end = self.end_minutes as i64;
        ((end - start) % MINUTES_PER_DAY + MINUTES_PER_DAY) % MINUTES_PER_DAY
    }

    /// Length in hours, taking the modulo-24 path for a shift that wraps
    /// past midnight (spec §3).
    pub fn length_hours(&self) -> f64 {
        self.length_minutes() as f64 / 60.0
    }

    /// True if this shift starts at or after 20:00, or before 06:00 (spec §4.4).
    pub fn is_night_default(&self) -> bool {
        self.start_minutes >= NIGHT_START_MINUTES || self.start_minutes < NIGHT_END_MINUTES
    }

    /// Rest gap in hours from the end of `self` on day t to the start of
    /// `other` on day t+1, accounting for wrap (spec §4.4 family 4).
    pub fn rest_gap_hours_to_next_day(&self, other: &Shift) -> f64 {
        let self_end_abs = self.start_minutes as i64 + self.length_minutes();
        let other_start_abs = MINUTES_PER_DAY + other.start_minutes as i64;
        (other_start_abs - self_end_abs) as f64 / 60.0
    }
}

/// A demand row (surrogate key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRow {
    pub id: u64,
    pub date: NaiveDate,
    pub shift_id: String,
    pub skill: String,
    pub required: u32,
}

/// A consistent, immutable view of the catalog taken at the moment a solve
/// begins (spec §4.2, GLOSSARY "Snapshot").
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub employees: Vec<Employee>,
    pub shifts: Vec<Shift>,
    pub demand: Vec<DemandRow>,
}

impl CatalogSnapshot {
    pub fn employee(&self, employee_id: &str) -> Option<&Employee> {
        self.employees.iter().find(|e| e.employee_id == employee_id)
    }

    pub fn shift(&self, shift_id: &str) -> Option<&Shift> {
        self.shifts.iter().find(|s| s.shift_id == shift_id)
    }

    /// Interns every skill token appearing in this snapshot — employee
    /// skills and demand-row required skills alike — so the model builder
    /// (C3) can compare skill membership over integer [`Token`]s instead of
    /// string equality (spec §9 "operate over integer indices inside the
    /// builder"). Rebuilt on every `snapshot()` call, matching the
    /// snapshot's own lifetime.
    pub fn intern_skills(&self) -> Interner {
        let mut interner = Interner::new();
        for e in &self.employees {
            for skill in &e.skills {
                interner.intern(skill);
            }
        }
        for d in &self.demand {
            interner.intern(&d.skill);
        }
        interner
    }
}

/// Repository abstraction over the catalog store (C1).
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_employee(&self, employee_id: &str) -> Option<Employee>;
    async fn get_shift(&self, shift_id: &str) -> Option<Shift>;
    /// Demand rows whose date falls in `[start, start + horizon_days)`.
    async fn demand_in_range(&self, start: NaiveDate, horizon_days: i64) -> Vec<DemandRow>;
    /// A consistent (employees, shifts, demand) triple.
    async fn snapshot(&self) -> CatalogSnapshot;
    async fn upsert_employee(&self, employee: Employee);
    async fn upsert_shift(&self, shift: Shift);
    async fn upsert_demand(&self, date: NaiveDate, shift_id: String, skill: String, required: u32) -> u64;
    async fn remove_employee(&self, employee_id: &str);
    /// Idempotent "load demo catalog" operation (spec §6). Has no effect on runs.
    async fn seed(&self);
}

#[derive(Default)]
struct Inner {
    employees: HashMap<String, Employee>,
    shifts: HashMap<String, Shift>,
    demand: Vec<DemandRow>,
}

/// In-memory catalog store. Mutations after a `snapshot()` call do not
/// affect a copy already handed to an in-flight solve (spec §4.2).
pub struct InMemoryCatalog {
    inner: RwLock<Inner>,
    next_demand_id: AtomicU64,
}

impl InMemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            next_demand_id: AtomicU64::new(1),
        })
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_demand_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn get_employee(&self, employee_id: &str) -> Option<Employee> {
        self.inner.read().employees.get(employee_id).cloned()
    }

    async fn get_shift(&self, shift_id: &str) -> Option<Shift> {
        self.inner.read().shifts.get(shift_id).cloned()
    }

    async fn demand_in_range(&self, start: NaiveDate, horizon_days: i64) -> Vec<DemandRow> {
        let end = start + chrono::Duration::days(horizon_days);
        self.inner
            .read()
            .demand
            .iter()
            .filter(|d| d.date >= start && d.date < end)
            .cloned()
            .collect()
    }

    async fn snapshot(&self) -> CatalogSnapshot {
        let inner = self.inner.read();
        CatalogSnapshot {
            employees: inner.employees.values().cloned().collect(),
            shifts: inner.shifts.values().cloned().collect(),
            demand: inner.demand.clone(),
        }
    }

    async fn upsert_employee(&self, employee: Employee) {
        self.inner
            .write()
            .employees
            .insert(employee.employee_id.clone(), employee);
    }

    async fn upsert_shift(&self, shift: Shift) {
        self.inner.write().shifts.insert(shift.shift_id.clone(), shift);
    }

    async fn upsert_demand(&self, date: NaiveDate, shift_id: String, skill: String, required: u32) -> u64 {
        let id = self.next_demand_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().demand.push(DemandRow {
            id,
            date,
            shift_id,
            skill,
            required,
        });
        id
    }

    async fn remove_employee(&self, employee_id: &str) {
        self.inner.write().employees.remove(employee_id);
    }

    async fn seed(&self) {
        let mut inner = self.inner.write();
        inner.employees.clear();
        inner.shifts.clear();
        inner.demand.clear();
        drop(inner);

        for employee in crate::demo_data::demo_employees() {
            self.upsert_employee(employee).await;
        }
        for shift in crate::demo_data::demo_shifts() {
            self.upsert_shift(shift).await;
        }
        for (date, shift_id, skill, required) in crate::demo_data::demo_demand() {
            self.upsert_demand(date, shift_id, skill, required).await;
        }
    }
}
