//! The Boolean assignment lattice and its derived expressions.
//!
//! `x(e, d, s)` is the primary decision: employee `e` takes shift `s` on day
//! `d`. The derived `work` and `minutes` variables are built on first use
//! and cached, so every lowerer that needs them shares one definition.

use selen::prelude::*;

use crate::error::RosterError;
use crate::normalize::NormalizedSpec;

/// Fail-fast ceiling on `employees x days x shifts` before any variable is
/// allocated.
pub const MAX_LATTICE_VARS: usize = 200_000;

pub struct Lattice {
    n_days: usize,
    n_shifts: usize,
    x: Vec<VarId>,
    work: Vec<Option<VarId>>,
    minutes: Vec<Option<VarId>>,
}

impl Lattice {
    /// Allocates the full cross-product of assignment variables.
    pub fn build(model: &mut Model, spec: &NormalizedSpec) -> Result<Self, RosterError> {
        let vars = spec.n_employees() * spec.n_days() * spec.n_shifts();
        if vars > MAX_LATTICE_VARS {
            return Err(RosterError::Capacity {
                vars,
                limit: MAX_LATTICE_VARS,
            });
        }
        let x = (0..vars).map(|_| model.bool()).collect();
        Ok(Self {
            n_days: spec.n_days(),
            n_shifts: spec.n_shifts(),
            x,
            work: vec![None; spec.n_employees() * spec.n_days()],
            minutes: vec![None; spec.n_employees() * spec.n_days()],
        })
    }

    #[inline]
    pub fn x(&self, employee: usize, day: usize, shift: usize) -> VarId {
        self.x[(employee * self.n_days + day) * self.n_shifts + shift]
    }

    /// Work indicator for (employee, day): the sum of the work-shift
    /// assignment variables.
    pub fn work(
        &mut self,
        model: &mut Model,
        spec: &NormalizedSpec,
        employee: usize,
        day: usize,
    ) -> VarId {
        let slot = employee * self.n_days + day;
        if let Some(var) = self.work[slot] {
            return var;
        }
        let xs: Vec<VarId> = spec
            .work_shifts
            .iter()
            .map(|&s| self.x(employee, day, s))
            .collect();
        let var = if xs.is_empty() {
            model.int(0, 0)
        } else {
            model.sum(&xs)
        };
        self.work[slot] = Some(var);
        var
    }

    /// Assigned minutes for (employee, day): the minute-weighted sum of the
    /// assignment variables. The rest label contributes nothing.
    pub fn minutes(
        &mut self,
        model: &mut Model,
        spec: &NormalizedSpec,
        employee: usize,
        day: usize,
    ) -> VarId {
        let slot = employee * self.n_days + day;
        if let Some(var) = self.minutes[slot] {
            return var;
        }
        let mut coefficients = Vec::new();
        let mut vars = Vec::new();
        let mut upper = 0i32;
        for (s, info) in spec.shifts.iter().enumerate() {
            if info.minutes == 0 {
                continue;
            }
            coefficients.push(info.minutes as i32);
            vars.push(self.x(employee, day, s));
            upper += info.minutes as i32;
        }
        let var = if vars.is_empty() {
            model.int(0, 0)
        } else {
            let total = model.int(0, upper);
            coefficients.push(-1);
            vars.push(total);
            model.int_lin_eq(&coefficients, &vars, 0);
            total
        };
        self.minutes[slot] = Some(var);
        var
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::ShiftInfo;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn synthetic(n_employees: usize, n_days: usize, n_shifts: usize) -> NormalizedSpec {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let shifts: Vec<ShiftInfo> = (0..n_shifts)
            .map(|s| ShiftInfo {
                label: if s == 0 { "OFF".to_string() } else { format!("S{s}") },
                minutes: if s == 0 { 0 } else { 480 },
                is_work: s != 0,
                start_min: 360,
                end_abs_min: 840,
            })
            .collect();
        NormalizedSpec {
            employees: (0..n_employees).map(|e| format!("P{e}")).collect(),
            days: (0..n_days).map(|d| start + chrono::Days::new(d as u64)).collect(),
            work_shifts: (1..n_shifts).collect(),
            shifts,
            sites: vec!["A".to_string()],
            emp_skills: vec![BTreeSet::new(); n_employees],
            emp_site: vec![None; n_employees],
            rest_shift: 0,
            demand: Vec::new(),
            rules: Vec::new(),
            objective_weight: 1,
        }
    }

    #[test]
    fn allocates_full_cross_product() {
        let spec = synthetic(3, 4, 2);
        let mut model = Model::default();
        let lattice = Lattice::build(&mut model, &spec).expect("build");
        let mut seen = std::collections::HashSet::new();
        for e in 0..3 {
            for d in 0..4 {
                for s in 0..2 {
                    assert!(seen.insert(lattice.x(e, d, s)), "duplicate variable");
                }
            }
        }
    }

    #[test]
    fn rejects_oversized_lattice() {
        let spec = synthetic(100, 100, 21);
        let mut model = Model::default();
        match Lattice::build(&mut model, &spec) {
            Err(RosterError::Capacity { vars, limit }) => {
                assert_eq!(vars, 210_000);
                assert_eq!(limit, MAX_LATTICE_VARS);
            }
            other => panic!("expected capacity error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn derived_expressions_are_cached() {
        let spec = synthetic(2, 2, 3);
        let mut model = Model::default();
        let mut lattice = Lattice::build(&mut model, &spec).expect("build");
        let first = lattice.work(&mut model, &spec, 0, 1);
        let again = lattice.work(&mut model, &spec, 0, 1);
        assert!(first == again, "work indicator was rebuilt");
        let minutes = lattice.minutes(&mut model, &spec, 1, 0);
        assert!(
            minutes == lattice.minutes(&mut model, &spec, 1, 0),
            "minutes expression was rebuilt"
        );
    }
}
