//! Projection of a solved assignment into the report views.
//!
//! Two views are emitted side by side: the nested
//! `data[day][site][shift] -> [employees]` grouping with its parallel
//! `rest[day]` map, and the flat row form ordered by (date, site, shift,
//! employee) in spec order. The rest label never appears in the site
//! grouping.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::normalize::NormalizedSpec;
use crate::solver::Assignment;

/// One row of the flat report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatAssignment {
    pub date: String,
    pub site: String,
    pub shift: String,
    pub employee: String,
}

/// The report views of one schedule.
#[derive(Debug, Clone, Serialize)]
pub struct Roster {
    /// day -> site -> shift -> employees, employees in spec order.
    pub data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    /// day -> employees assigned the rest label, in spec order.
    pub rest: BTreeMap<String, Vec<String>>,
    pub flat: Vec<FlatAssignment>,
}

/// Folds the flat assignment into the nested and flat views. A work row is
/// attributed to the employee's home site; employees without a site
/// restriction fall back to the first site in spec order.
pub fn project(spec: &NormalizedSpec, assignment: &Assignment) -> Roster {
    let mut rest_days: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    // (day, site, shift, employee) in spec-order indices, so one sort yields
    // the report order.
    let mut keys: Vec<(usize, usize, usize, usize)> = Vec::new();
    for &(e, d, s) in &assignment.triples {
        if s == spec.rest_shift {
            rest_days.entry(d).or_default().push(e);
        } else {
            let site = spec.emp_site[e].unwrap_or(0);
            keys.push((d, site, s, e));
        }
    }
    keys.sort_unstable();

    let mut data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>> =
        BTreeMap::new();
    let mut flat = Vec::with_capacity(keys.len());
    for (d, site, s, e) in keys {
        let date = spec.days[d].to_string();
        let site_id = spec.sites.get(site).cloned().unwrap_or_default();
        let shift = spec.shifts[s].label.clone();
        let employee = spec.employees[e].clone();
        data.entry(date.clone())
            .or_default()
            .entry(site_id.clone())
            .or_default()
            .entry(shift.clone())
            .or_default()
            .push(employee.clone());
        flat.push(FlatAssignment {
            date,
            site: site_id,
            shift,
            employee,
        });
    }

    let mut rest = BTreeMap::new();
    for (d, mut employees) in rest_days {
        employees.sort_unstable();
        let _ = rest.insert(
            spec.days[d].to_string(),
            employees.into_iter().map(|e| spec.employees[e].clone()).collect(),
        );
    }

    Roster { data, rest, flat }
}
