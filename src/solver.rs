//! Objective assembly and the solve driver.
//!
//! The CP model is a value owned by one solve: built, handed to the engine,
//! and dropped with it. Engine termination is collapsed to the five
//! statuses of the result contract.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use selen::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::constraints::{self, PenaltyTerm};
use crate::error::RosterError;
use crate::lattice::Lattice;
use crate::normalize::{self, NormalizedSpec, RuleBody};
use crate::schedule::{self, Roster};
use crate::schema;

/// Engine limits for one solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOptions {
    pub max_time_seconds: u64,
    /// Accepted for wire compatibility and recorded with the job; the
    /// engine's search is single-threaded.
    pub workers: usize,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_time_seconds: 30,
            workers: 1,
        }
    }
}

/// Collapsed engine termination status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
    Error,
}

impl SolveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "OPTIMAL",
            Self::Feasible => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::Timeout => "TIMEOUT",
            Self::Error => "ERROR",
        }
    }

    /// Whether the driver extracted an assignment for this status.
    pub fn has_assignment(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// The (employee, day, shift) triples assigned 1 in the solved lattice.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub triples: Vec<(usize, usize, usize)>,
}

/// Raw solve result, before projection into report views.
#[derive(Debug)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    pub objective_value: Option<i64>,
    pub assignment: Option<Assignment>,
    /// Unweighted violation count per rule id.
    pub penalties: BTreeMap<String, i64>,
    pub message: Option<String>,
    pub bound: Option<i64>,
}

/// A solve outcome with the schedule projected into its report views.
#[derive(Debug)]
pub struct RosterOutcome {
    pub status: SolveStatus,
    pub objective_value: Option<i64>,
    pub roster: Option<Roster>,
    pub penalties: BTreeMap<String, i64>,
    pub message: Option<String>,
    pub bound: Option<i64>,
}

/// Runs the full pipeline on a raw document: schema validation,
/// normalization, lowering, solving and projection.
pub fn solve_document(doc: &Value, options: &SolveOptions) -> Result<RosterOutcome, RosterError> {
    let report = schema::validate(doc);
    if !report.valid {
        return Err(RosterError::Schema(report.errors));
    }
    let spec = normalize::normalize(doc)?;
    let outcome = solve(&spec, options)?;
    let roster = outcome
        .assignment
        .as_ref()
        .map(|assignment| schedule::project(&spec, assignment));
    Ok(RosterOutcome {
        status: outcome.status,
        objective_value: outcome.objective_value,
        roster,
        penalties: outcome.penalties,
        message: outcome.message,
        bound: outcome.bound,
    })
}

/// Builds the model for a normalized spec and drives the engine.
pub fn solve(spec: &NormalizedSpec, options: &SolveOptions) -> Result<SolveOutcome, RosterError> {
    let mut model = Model::with_config(
        SolverConfig::default()
            .with_timeout_ms(options.max_time_seconds.saturating_mul(1000))
            .with_max_memory_mb(2048),
    );

    let mut lattice = Lattice::build(&mut model, spec)?;
    constraints::apply_demand(&mut model, &lattice, spec);

    let mut terms: Vec<PenaltyTerm> = Vec::new();
    for rule in &spec.rules {
        match &rule.body {
            RuleBody::Hard(hard) => {
                constraints::apply_hard(&mut model, &mut lattice, spec, &rule.scope, hard);
            }
            RuleBody::Soft { rule: soft, weight } => {
                if let Some(term) = constraints::apply_soft(
                    &mut model,
                    &mut lattice,
                    spec,
                    &rule.id,
                    *weight,
                    &rule.scope,
                    soft,
                ) {
                    terms.push(term);
                }
            }
        }
    }

    let objective = assemble_objective(&mut model, spec.objective_weight, &terms);

    debug!(
        employees = spec.n_employees(),
        days = spec.n_days(),
        shifts = spec.n_shifts(),
        soft_terms = terms.len(),
        "roster model built"
    );

    let budget = Duration::from_secs(options.max_time_seconds);
    let started = Instant::now();
    let mut best = None;
    for solution in model.minimize_and_iterate(objective) {
        best = Some(solution);
    }
    let timed_out = started.elapsed() >= budget;

    let outcome = match best {
        Some(solution) => {
            let status = if timed_out {
                SolveStatus::Feasible
            } else {
                SolveStatus::Optimal
            };
            let mut triples = Vec::new();
            for e in 0..spec.n_employees() {
                for d in 0..spec.n_days() {
                    for s in 0..spec.n_shifts() {
                        if int_value(&solution, lattice.x(e, d, s)) == 1 {
                            triples.push((e, d, s));
                        }
                    }
                }
            }
            let mut penalties = BTreeMap::new();
            for term in &terms {
                *penalties.entry(term.rule_id.clone()).or_insert(0) +=
                    int_value(&solution, term.var);
            }
            let objective_value = int_value(&solution, objective);
            SolveOutcome {
                status,
                objective_value: Some(objective_value),
                assignment: Some(Assignment { triples }),
                penalties,
                message: None,
                bound: Some(objective_value),
            }
        }
        None => {
            let status = if timed_out {
                SolveStatus::Timeout
            } else {
                SolveStatus::Infeasible
            };
            SolveOutcome {
                status,
                objective_value: None,
                assignment: None,
                penalties: BTreeMap::new(),
                message: Some(match status {
                    SolveStatus::Timeout => "no feasible schedule found within the time budget".to_string(),
                    _ => "no feasible schedule satisfies the hard rules and demand".to_string(),
                }),
                bound: None,
            }
        }
    };

    info!(
        status = outcome.status.as_str(),
        objective = outcome.objective_value,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "solve finished"
    );
    Ok(outcome)
}

fn int_value(solution: &Solution, var: VarId) -> i64 {
    match solution[var] {
        Val::ValI(v) => v as i64,
        _ => 0,
    }
}

/// Accumulates every penalty variable into the single minimization sum.
/// The global multiplier comes from the spec's `objective.terms` entry.
fn assemble_objective(model: &mut Model, global_weight: u32, terms: &[PenaltyTerm]) -> VarId {
    if terms.is_empty() || global_weight == 0 {
        return model.int(0, 0);
    }
    let mut upper: i64 = 0;
    let mut coefficients = Vec::with_capacity(terms.len() + 1);
    let mut vars = Vec::with_capacity(terms.len() + 1);
    for term in terms {
        let coefficient = (global_weight as i64 * term.weight as i64).min(i32::MAX as i64) as i32;
        upper += coefficient as i64 * term.upper;
        coefficients.push(-coefficient);
        vars.push(term.var);
    }
    let objective = model.int(0, upper.min(i32::MAX as i64 / 2) as i32);
    coefficients.push(1);
    vars.push(objective);
    model.int_lin_eq(&coefficients, &vars, 0);
    objective
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_doc(
        employees: &[&str],
        days: &[&str],
        work_shifts: serde_json::Value,
        sites: &[&str],
    ) -> Value {
        let mut shift_labels: Vec<String> = work_shifts
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        shift_labels.push("OFF".to_string());
        let mut shifts = work_shifts.as_object().unwrap().clone();
        let _ = shifts.insert(
            "OFF".to_string(),
            json!({"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}),
        );
        let employee_defs: serde_json::Map<String, Value> = employees
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    json!({"skills": [], "roles": [], "contract": {"type": "full_time"}}),
                )
            })
            .collect();
        json!({
            "sets": {
                "employees": employees,
                "days": days,
                "shifts": &shift_labels,
                "sites": sites
            },
            "shifts": shifts,
            "employees": employee_defs,
            "demand": [],
            "constraints": [
                {"kind": "exactly_one_assignment_per_day",
                 "scope": {"employees": "ALL"},
                 "shifts": &shift_labels}
            ],
            "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
        })
    }

    fn morning() -> Value {
        json!({"M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true}})
    }

    fn run(doc: &Value, seconds: u64) -> RosterOutcome {
        solve_document(
            doc,
            &SolveOptions {
                max_time_seconds: seconds,
                workers: 1,
            },
        )
        .expect("pipeline")
    }

    fn shift_of<'a>(outcome: &'a RosterOutcome, employee: &str, date: &str) -> &'a str {
        let roster = outcome.roster.as_ref().expect("roster");
        if roster.rest.get(date).is_some_and(|r| r.iter().any(|e| e == employee)) {
            return "OFF";
        }
        roster
            .flat
            .iter()
            .find(|row| row.employee == employee && row.date == date)
            .map(|row| row.shift.as_str())
            .expect("assignment")
    }

    #[test]
    fn trivial_cover_assigns_the_only_employee() {
        let mut doc = base_doc(&["P1"], &["2026-03-02"], morning(), &["A"]);
        doc["demand"] = json!([{"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1}]);
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.objective_value, Some(0));
        assert_eq!(shift_of(&outcome, "P1", "2026-03-02"), "M");
    }

    #[test]
    fn impossible_cover_is_infeasible() {
        let mut doc = base_doc(&["P1"], &["2026-03-02"], morning(), &["A"]);
        doc["demand"] = json!([{"day": "2026-03-02", "site": "A", "shift": "M", "eq": 2}]);
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.roster.is_none());
        assert!(outcome.message.is_some());
    }

    #[test]
    fn forbidden_sequence_blocks_the_pair_across_days() {
        let shifts = json!({
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true},
            "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true}
        });
        let days = ["2026-03-02", "2026-03-03"];
        let mut doc = base_doc(&["P1", "P2"], &days, shifts, &["A"]);
        doc["demand"] = json!(days
            .iter()
            .flat_map(|d| ["N", "M"]
                .into_iter()
                .map(move |s| json!({"day": d, "site": "A", "shift": s, "eq": 1})))
            .collect::<Vec<_>>());
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "kind": "forbid_shift_sequences",
            "scope": {"employees": "ALL"},
            "sequences": [{"prev_shift": "N", "next_shift": "M"}]
        }));
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        for employee in ["P1", "P2"] {
            if shift_of(&outcome, employee, "2026-03-02") == "N" {
                assert_ne!(shift_of(&outcome, employee, "2026-03-03"), "M");
            }
        }
    }

    #[test]
    fn met_day_off_request_costs_nothing() {
        let mut doc = base_doc(&["P1", "P2"], &["2026-03-02"], morning(), &["A"]);
        doc["demand"] = json!([{"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1}]);
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "id": "p1-day-off",
            "kind": "penalize_unmet_day_off_requests",
            "requests": [{"employee": "P1", "day": "2026-03-02"}],
            "penalty": {"weight": 5}
        }));
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.objective_value, Some(0));
        assert_eq!(outcome.penalties.get("p1-day-off"), Some(&0));
        assert_eq!(shift_of(&outcome, "P1", "2026-03-02"), "OFF");
        assert_eq!(shift_of(&outcome, "P2", "2026-03-02"), "M");
    }

    #[test]
    fn fair_distribution_balances_night_counts() {
        let shifts = json!({
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true}
        });
        let days: Vec<String> = (2..16).map(|d| format!("2026-03-{d:02}")).collect();
        let day_refs: Vec<&str> = days.iter().map(String::as_str).collect();
        let mut doc = base_doc(&["P1", "P2", "P3", "P4"], &day_refs, shifts, &["A"]);
        doc["demand"] = json!(days
            .iter()
            .map(|d| json!({"day": d, "site": "A", "shift": "N", "eq": 1}))
            .collect::<Vec<_>>());
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "id": "fair-nights",
            "kind": "fair_distribution",
            "scope": {"employees": "ALL"},
            "measure": "count",
            "shifts": ["N"],
            "window_days": 14,
            "target": "auto_mean",
            "penalize": "absolute_deviation",
            "penalty": {"weight": 1}
        }));
        let outcome = run(&doc, 20);
        assert!(outcome.status.has_assignment(), "status {:?}", outcome.status);
        if outcome.status == SolveStatus::Optimal {
            // 14 nights over 4 employees: the best split is 4/4/3/3 with a
            // total deviation of 2 from the floor mean of 3.
            assert!(outcome.objective_value.expect("objective") <= 2);
            let roster = outcome.roster.as_ref().expect("roster");
            let mut counts = std::collections::BTreeMap::new();
            for employee in ["P1", "P2", "P3", "P4"] {
                let _ = counts.entry(employee.to_string()).or_insert(0usize);
            }
            for row in &roster.flat {
                *counts.entry(row.employee.clone()).or_insert(0usize) += 1;
            }
            let max = counts.values().copied().max().unwrap_or(0);
            let min = counts.values().copied().min().unwrap_or(0);
            assert!(max - min <= 2, "night counts {counts:?}");
        }
    }

    #[test]
    fn short_rest_gap_forbids_the_overnight_pair() {
        let shifts = json!({
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true},
            "M": {"start": "07:00", "end": "15:00", "minutes": 480, "is_work": true}
        });
        let mut doc = base_doc(&["P1", "P2"], &["2026-03-02", "2026-03-03"], shifts, &["A"]);
        doc["demand"] = json!([
            {"day": "2026-03-02", "site": "A", "shift": "N", "eq": 1},
            {"day": "2026-03-03", "site": "A", "shift": "M", "eq": 1}
        ]);
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "kind": "min_rest_minutes_between_shifts",
            "scope": {"employees": "ALL"},
            "minutes": 660
        }));
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let night_worker = ["P1", "P2"]
            .into_iter()
            .find(|&e| shift_of(&outcome, e, "2026-03-02") == "N")
            .expect("night worker");
        assert_ne!(shift_of(&outcome, night_worker, "2026-03-03"), "M");
    }

    #[test]
    fn consecutive_work_day_runs_are_capped() {
        let days: Vec<String> = (2..9).map(|d| format!("2026-03-{d:02}")).collect();
        let day_refs: Vec<&str> = days.iter().map(String::as_str).collect();
        let mut doc = base_doc(&["P1", "P2"], &day_refs, morning(), &["A"]);
        doc["demand"] = json!(days
            .iter()
            .map(|d| json!({"day": d, "site": "A", "shift": "M", "eq": 1}))
            .collect::<Vec<_>>());
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "kind": "max_consecutive_work_days",
            "scope": {"employees": "ALL"},
            "max": 3
        }));
        let outcome = run(&doc, 15);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let roster = outcome.roster.as_ref().expect("roster");
        for employee in ["P1", "P2"] {
            let mut run_len = 0usize;
            for date in &days {
                let worked = roster
                    .flat
                    .iter()
                    .any(|row| row.employee == *employee && row.date == *date);
                run_len = if worked { run_len + 1 } else { 0 };
                assert!(run_len <= 3, "{employee} works more than 3 days in a row");
            }
        }
    }

    #[test]
    fn max_shifts_in_window_holds_on_every_window() {
        let shifts = json!({
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true}
        });
        let days: Vec<String> = (2..9).map(|d| format!("2026-03-{d:02}")).collect();
        let day_refs: Vec<&str> = days.iter().map(String::as_str).collect();
        let mut doc = base_doc(&["P1", "P2", "P3"], &day_refs, shifts, &["A"]);
        doc["demand"] = json!(days
            .iter()
            .map(|d| json!({"day": d, "site": "A", "shift": "N", "eq": 1}))
            .collect::<Vec<_>>());
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "kind": "max_shifts_in_window",
            "scope": {"employees": "ALL"},
            "window_days": 3,
            "shifts": ["N"],
            "max": 1,
            "mode": "rolling"
        }));
        let outcome = run(&doc, 15);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let roster = outcome.roster.as_ref().expect("roster");
        for employee in ["P1", "P2", "P3"] {
            for window in days.windows(3) {
                let nights = window
                    .iter()
                    .filter(|date| {
                        roster
                            .flat
                            .iter()
                            .any(|row| row.employee == *employee && row.date == **date)
                    })
                    .count();
                assert!(nights <= 1, "{employee} exceeds window cap");
            }
        }
    }

    #[test]
    fn objective_value_matches_recomputed_penalties() {
        // Cover requires work on an undesired day, so the penalty is paid.
        let mut doc = base_doc(&["P1"], &["2026-03-02", "2026-03-03"], morning(), &["A"]);
        doc["demand"] = json!([
            {"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1},
            {"day": "2026-03-03", "site": "A", "shift": "M", "eq": 1}
        ]);
        doc["constraints"].as_array_mut().unwrap().push(json!({
            "id": "avoid-tuesday",
            "kind": "penalize_work_on_days",
            "scope": {"employees": "ALL"},
            "days": ["2026-03-03"],
            "penalty": {"weight": 7}
        }));
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.penalties.get("avoid-tuesday"), Some(&1));
        assert_eq!(outcome.objective_value, Some(7));
    }

    #[test]
    fn schema_violations_never_reach_the_solver() {
        let doc = json!({"sets": {}});
        match solve_document(&doc, &SolveOptions::default()) {
            Err(RosterError::Schema(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn reference_violations_never_reach_the_solver() {
        let mut doc = base_doc(&["P1"], &["2026-03-02"], morning(), &["A"]);
        doc["demand"] = json!([{"day": "2026-03-02", "site": "B", "shift": "M", "eq": 1}]);
        match solve_document(&doc, &SolveOptions::default()) {
            Err(RosterError::Reference(errors)) => {
                assert!(errors.iter().any(|e| e.contains("unknown site `B`")));
            }
            other => panic!("expected reference error, got {other:?}"),
        }
    }

    #[test]
    fn demand_zero_keeps_everyone_off() {
        let mut doc = base_doc(&["P1", "P2"], &["2026-03-02"], morning(), &["A"]);
        doc["demand"] = json!([{"day": "2026-03-02", "site": "A", "shift": "M", "eq": 0}]);
        let outcome = run(&doc, 10);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let roster = outcome.roster.as_ref().expect("roster");
        assert!(roster.flat.is_empty());
        assert_eq!(
            roster.rest.get("2026-03-02").map(Vec::len),
            Some(2),
            "both employees rest"
        );
    }
}
