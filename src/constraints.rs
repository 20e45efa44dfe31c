//! Lowering of demand coverage and the rule catalog onto the lattice.
//!
//! Each hard kind becomes one family of linear constraints; each soft kind
//! becomes a single non-negative penalty variable wired to the expressions
//! it counts. Windowed rules slide over `sets.days` and are truncated at the
//! calendar tail, never wrapped.

use selen::prelude::*;

use crate::lattice::Lattice;
use crate::normalize::{DemandBounds, HardRule, NormalizedSpec, ShiftInfo, SoftRule};

/// One penalty expression contributed by a soft rule.
pub struct PenaltyTerm {
    pub rule_id: String,
    pub weight: u32,
    pub var: VarId,
    /// Inclusive upper bound of `var`; sizes the objective domain.
    pub upper: i64,
}

// ============================================================================
// Demand coverage (implicit, always enforced)
// ============================================================================

/// Posts headcount and skill coverage for every demand entry. The sum runs
/// over the employees eligible for the entry's site.
pub fn apply_demand(model: &mut Model, lattice: &Lattice, spec: &NormalizedSpec) {
    for entry in &spec.demand {
        let vars: Vec<VarId> = entry
            .eligible
            .iter()
            .map(|&e| lattice.x(e, entry.day, entry.shift))
            .collect();
        match entry.bounds {
            DemandBounds::Exactly(n) => sum_eq(model, &vars, n as i32),
            DemandBounds::Between(min, max) => {
                sum_ge(model, &vars, min as i32);
                sum_le(model, &vars, max as i32);
            }
        }
        for (skill, min) in &entry.skills_min {
            let skilled: Vec<VarId> = entry
                .eligible
                .iter()
                .filter(|&&e| spec.emp_skills[e].contains(skill))
                .map(|&e| lattice.x(e, entry.day, entry.shift))
                .collect();
            sum_ge(model, &skilled, *min as i32);
        }
    }
}

// ============================================================================
// Hard rules
// ============================================================================

/// Lowers one hard rule for every employee in its scope.
pub fn apply_hard(
    model: &mut Model,
    lattice: &mut Lattice,
    spec: &NormalizedSpec,
    scope: &[usize],
    rule: &HardRule,
) {
    let n_days = spec.n_days();
    match rule {
        HardRule::ExactlyOneAssignmentPerDay => {
            for &e in scope {
                for d in 0..n_days {
                    let vars: Vec<VarId> =
                        (0..spec.n_shifts()).map(|s| lattice.x(e, d, s)).collect();
                    sum_eq(model, &vars, 1);
                }
            }
        }
        HardRule::ForbidShiftSequences { sequences } => {
            for &e in scope {
                for d in 1..n_days {
                    for &(prev, next) in sequences {
                        at_most_one_of(model, lattice.x(e, d - 1, prev), lattice.x(e, d, next));
                    }
                }
            }
        }
        HardRule::MaxShiftsInWindow {
            window_days,
            shifts,
            max,
        } => {
            for &e in scope {
                for window in windows_truncated(n_days, *window_days) {
                    let vars: Vec<VarId> = window
                        .flat_map(|d| shifts.iter().map(move |&s| (d, s)))
                        .map(|(d, s)| lattice.x(e, d, s))
                        .collect();
                    sum_le(model, &vars, *max as i32);
                }
            }
        }
        HardRule::MinRestMinutesBetweenShifts { minutes } => {
            for d in 1..n_days {
                let day_span = (spec.days[d] - spec.days[d - 1]).num_days();
                for &prev in &spec.work_shifts {
                    for &next in &spec.work_shifts {
                        let gap = rest_gap_minutes(day_span, &spec.shifts[prev], &spec.shifts[next]);
                        if gap < *minutes as i64 {
                            for &e in scope {
                                at_most_one_of(
                                    model,
                                    lattice.x(e, d - 1, prev),
                                    lattice.x(e, d, next),
                                );
                            }
                        }
                    }
                }
            }
        }
        HardRule::MaxWorkMinutesInWindow {
            window_days,
            max_minutes,
        } => {
            for &e in scope {
                for window in windows_truncated(n_days, *window_days) {
                    let vars: Vec<VarId> = window
                        .map(|d| lattice.minutes(model, spec, e, d))
                        .collect();
                    sum_le(model, &vars, *max_minutes as i32);
                }
            }
        }
        HardRule::MaxConsecutiveWorkDays { max } => {
            let span = max + 1;
            for &e in scope {
                for start in 0..(n_days + 1).saturating_sub(span) {
                    let vars: Vec<VarId> = (start..start + span)
                        .map(|d| lattice.work(model, spec, e, d))
                        .collect();
                    sum_le(model, &vars, *max as i32);
                }
            }
        }
        HardRule::MinConsecutiveDaysOff { min } => {
            // Forbid "work, exactly len days off, work" for every len below
            // the minimum. Runs touching the calendar edge are unconstrained.
            for &e in scope {
                for d in 1..n_days {
                    for len in 1..*min {
                        if d + len >= n_days {
                            break;
                        }
                        let mut coefficients = vec![1, 1];
                        let mut vars = vec![
                            lattice.work(model, spec, e, d - 1),
                            lattice.work(model, spec, e, d + len),
                        ];
                        for j in 0..len {
                            coefficients.push(-1);
                            vars.push(lattice.work(model, spec, e, d + j));
                        }
                        model.int_lin_le(&coefficients, &vars, 1);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Soft rules
// ============================================================================

/// Lowers one soft rule into a penalty term, or nothing when the rule has an
/// empty domain.
pub fn apply_soft(
    model: &mut Model,
    lattice: &mut Lattice,
    spec: &NormalizedSpec,
    rule_id: &str,
    weight: u32,
    scope: &[usize],
    rule: &SoftRule,
) -> Option<PenaltyTerm> {
    let (var, upper) = match rule {
        SoftRule::PenalizeWorkOnDays { days } => {
            let mut vars = Vec::with_capacity(scope.len() * days.len());
            for &e in scope {
                for &d in days {
                    vars.push(lattice.work(model, spec, e, d));
                }
            }
            bounded_sum(model, vars, spec.work_shifts.len() as i64)?
        }
        SoftRule::PenalizeWorkOnShifts { shifts } => {
            let mut vars = Vec::with_capacity(scope.len() * spec.n_days() * shifts.len());
            for &e in scope {
                for d in 0..spec.n_days() {
                    for &s in shifts {
                        vars.push(lattice.x(e, d, s));
                    }
                }
            }
            bounded_sum(model, vars, 1)?
        }
        SoftRule::PenalizeUnmetDayOffRequests { requests } => {
            let mut vars = Vec::with_capacity(requests.len());
            for &(e, d) in requests {
                vars.push(lattice.work(model, spec, e, d));
            }
            bounded_sum(model, vars, spec.work_shifts.len() as i64)?
        }
        SoftRule::FairDistribution {
            shifts,
            window_days,
        } => fair_distribution(model, lattice, spec, scope, shifts, *window_days)?,
    };
    Some(PenaltyTerm {
        rule_id: rule_id.to_string(),
        weight,
        var,
        upper,
    })
}

/// Absolute-deviation fairness: per window, per scope employee, the count of
/// matching assignments is split around the in-model floor mean with a pair
/// of non-negative slacks whose sum is the deviation.
fn fair_distribution(
    model: &mut Model,
    lattice: &mut Lattice,
    spec: &NormalizedSpec,
    scope: &[usize],
    shifts: &[usize],
    window_days: usize,
) -> Option<(VarId, i64)> {
    if scope.is_empty() || shifts.is_empty() {
        return None;
    }
    let mut deviations = Vec::new();
    let mut upper = 0i64;
    for window in windows_full(spec.n_days(), window_days) {
        let count_upper = (window.len() * shifts.len()) as i32;
        let mut counts = Vec::with_capacity(scope.len());
        for &e in scope {
            let xs: Vec<VarId> = window
                .clone()
                .flat_map(|d| shifts.iter().map(move |&s| (d, s)))
                .map(|(d, s)| lattice.x(e, d, s))
                .collect();
            counts.push(model.sum(&xs));
        }
        let total = model.sum(&counts);
        let members = scope.len() as i32;
        // mean = floor(total / members), held by the pair of inequalities
        // members*mean <= total <= members*mean + members - 1.
        let mean = model.int(0, count_upper);
        model.int_lin_le(&[members, -1], &[mean, total], 0);
        model.int_lin_le(&[1, -members], &[total, mean], members - 1);
        for &count in &counts {
            let over = model.int(0, count_upper);
            let under = model.int(0, count_upper);
            model.int_lin_eq(&[1, -1, -1, 1], &[count, mean, over, under], 0);
            deviations.push(over);
            deviations.push(under);
            upper += 2 * count_upper as i64;
        }
    }
    if deviations.is_empty() {
        return None;
    }
    Some((model.sum(&deviations), upper))
}

// ============================================================================
// Helpers
// ============================================================================

/// Minutes between the end of `prev` (assigned `day_span` calendar days
/// before `next`) and the start of `next`. Negative when the shifts overlap.
pub fn rest_gap_minutes(day_span: i64, prev: &ShiftInfo, next: &ShiftInfo) -> i64 {
    day_span * 24 * 60 + next.start_min as i64 - prev.end_abs_min as i64
}

/// Every window of `window` consecutive day indices, truncated at the tail.
fn windows_truncated(n_days: usize, window: usize) -> impl Iterator<Item = std::ops::Range<usize>> {
    (0..n_days).map(move |start| start..(start + window).min(n_days))
}

/// Only full-length windows; degrades to the whole horizon when it is
/// shorter than the window.
fn windows_full(n_days: usize, window: usize) -> Vec<std::ops::Range<usize>> {
    if n_days == 0 {
        return Vec::new();
    }
    if n_days < window {
        return vec![0..n_days];
    }
    (0..=n_days - window).map(|start| start..start + window).collect()
}

fn at_most_one_of(model: &mut Model, a: VarId, b: VarId) {
    model.int_lin_le(&[1, 1], &[a, b], 1);
}

fn sum_eq(model: &mut Model, vars: &[VarId], value: i32) {
    if vars.is_empty() {
        if value != 0 {
            post_false(model);
        }
        return;
    }
    model.int_lin_eq(&vec![1; vars.len()], vars, value);
}

fn sum_le(model: &mut Model, vars: &[VarId], bound: i32) {
    if vars.is_empty() {
        if bound < 0 {
            post_false(model);
        }
        return;
    }
    model.int_lin_le(&vec![1; vars.len()], vars, bound);
}

fn sum_ge(model: &mut Model, vars: &[VarId], bound: i32) {
    if vars.is_empty() {
        if bound > 0 {
            post_false(model);
        }
        return;
    }
    model.int_lin_le(&vec![-1; vars.len()], vars, -bound);
}

/// Sums `vars` into a fresh variable, with the conservative upper bound
/// `vars.len() * per_var`. Returns `None` for an empty domain.
fn bounded_sum(model: &mut Model, vars: Vec<VarId>, per_var: i64) -> Option<(VarId, i64)> {
    if vars.is_empty() {
        return None;
    }
    let upper = vars.len() as i64 * per_var;
    Some((model.sum(&vars), upper))
}

/// A trivially unsatisfiable constraint, for coverage over an empty
/// eligible set.
fn post_false(model: &mut Model) {
    let zero = model.int(0, 0);
    model.new(zero.eq(1));
}
