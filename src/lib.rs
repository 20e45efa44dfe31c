//! Spec-driven employee rostering.
//!
//! A declarative roster spec (employees, days, shift templates, per-site
//! demand, hard and soft rules) is validated, lowered into a constraint
//! model over Boolean assignment variables, solved with a CP engine, and
//! projected back into a schedule grouped by day, site and shift.

pub mod api;
pub mod constraints;
pub mod demo_data;
pub mod error;
pub mod lattice;
pub mod normalize;
pub mod schedule;
pub mod schema;
pub mod solver;
pub mod spec;
