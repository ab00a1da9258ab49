//! Hospital staff scheduling core.
//!
//! Accepts a validated scheduling request over a planning horizon, builds a
//! MILP over an elastic/penalized coverage formulation, drives an external
//! MILP backend to a terminal outcome, diagnoses infeasibility, and emits an
//! enriched roster. Does not do real-time re-optimization, multi-tenant
//! isolation, cross-horizon rolling plans, or heuristic solver fallback.

pub mod api;
pub mod catalog;
pub mod config;
pub mod demo_data;
pub mod enrich;
pub mod error;
pub mod interning;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod solver;
