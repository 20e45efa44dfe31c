//! Spec normalization.
//!
//! Runs after [`crate::schema`]: resolves every cross-reference, checks the
//! semantic invariants the schema cannot express (strictly increasing days,
//! the exact rest-shift shape, the recognized rule catalog) and emits a
//! [`NormalizedSpec`] with explicit expanded scopes and index-based ids.
//! Like the schema pass, it reports all violations at once.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::RosterError;
use crate::spec::{clock_minutes, ScopeEmployees, Spec, REST_SHIFT};

/// Per-shift data precomputed for the lowerers.
#[derive(Debug, Clone)]
pub struct ShiftInfo {
    pub label: String,
    pub minutes: u32,
    pub is_work: bool,
    /// Clock start in minutes since midnight of the assigned day.
    pub start_min: u32,
    /// Clock end in minutes since midnight of the assigned day. An end at or
    /// before the start rolls over to the following day.
    pub end_abs_min: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandBounds {
    Exactly(u32),
    Between(u32, u32),
}

/// A demand entry with every id resolved to its spec-order index.
#[derive(Debug, Clone)]
pub struct NormalizedDemand {
    pub day: usize,
    pub site: usize,
    pub shift: usize,
    pub bounds: DemandBounds,
    pub skills_min: Vec<(String, u32)>,
    /// Employees eligible for the entry's site, in spec order.
    pub eligible: Vec<usize>,
}

/// The closed catalog of hard rule kinds.
#[derive(Debug, Clone)]
pub enum HardRule {
    /// Declared with the full shift set; the sum over all labels is one.
    ExactlyOneAssignmentPerDay,
    ForbidShiftSequences { sequences: Vec<(usize, usize)> },
    MaxShiftsInWindow { window_days: usize, shifts: Vec<usize>, max: u32 },
    MinRestMinutesBetweenShifts { minutes: u32 },
    MaxWorkMinutesInWindow { window_days: usize, max_minutes: u32 },
    MaxConsecutiveWorkDays { max: usize },
    MinConsecutiveDaysOff { min: usize },
}

/// The closed catalog of soft rule kinds.
#[derive(Debug, Clone)]
pub enum SoftRule {
    PenalizeWorkOnDays { days: Vec<usize> },
    PenalizeWorkOnShifts { shifts: Vec<usize> },
    PenalizeUnmetDayOffRequests { requests: Vec<(usize, usize)> },
    FairDistribution { shifts: Vec<usize>, window_days: usize },
}

#[derive(Debug, Clone)]
pub enum RuleBody {
    Hard(HardRule),
    Soft { rule: SoftRule, weight: u32 },
}

#[derive(Debug, Clone)]
pub struct Rule {
    /// The entry id when given, else the kind. Keys the penalty report.
    pub id: String,
    /// Expanded employee scope, in spec order.
    pub scope: Vec<usize>,
    pub body: RuleBody,
}

/// A fully resolved spec, ready for the variable builder and lowerers.
#[derive(Debug, Clone)]
pub struct NormalizedSpec {
    pub employees: Vec<String>,
    pub days: Vec<NaiveDate>,
    pub shifts: Vec<ShiftInfo>,
    pub sites: Vec<String>,
    pub emp_skills: Vec<BTreeSet<String>>,
    pub emp_site: Vec<Option<usize>>,
    pub rest_shift: usize,
    /// Indices of shifts with `is_work`, in spec order.
    pub work_shifts: Vec<usize>,
    pub demand: Vec<NormalizedDemand>,
    pub rules: Vec<Rule>,
    /// Global multiplier from `objective.terms`.
    pub objective_weight: u32,
}

impl NormalizedSpec {
    pub fn n_employees(&self) -> usize {
        self.employees.len()
    }

    pub fn n_days(&self) -> usize {
        self.days.len()
    }

    pub fn n_shifts(&self) -> usize {
        self.shifts.len()
    }
}

struct Indexes {
    employees: HashMap<String, usize>,
    days: HashMap<NaiveDate, usize>,
    shifts: HashMap<String, usize>,
    sites: HashMap<String, usize>,
}

/// Normalizes a schema-valid document. All reference violations are
/// accumulated and returned together.
pub fn normalize(doc: &Value) -> Result<NormalizedSpec, RosterError> {
    let spec: Spec = serde_json::from_value(doc.clone())
        .map_err(|e| RosterError::Reference(vec![format!("spec does not deserialize: {e}")]))?;

    let mut errors = Vec::new();
    let indexes = build_indexes(&spec, &mut errors);

    check_day_order(&spec, &mut errors);
    let shifts = resolve_shifts(&spec, &mut errors);
    let rest_shift = indexes.shifts.get(REST_SHIFT).copied().unwrap_or(0);
    if !indexes.shifts.contains_key(REST_SHIFT) {
        errors.push(format!("sets.shifts: missing rest label `{REST_SHIFT}`"));
    }
    let (emp_skills, emp_site) = resolve_employees(&spec, &indexes, &mut errors);
    let demand = resolve_demand(&spec, &indexes, &emp_site, &mut errors);
    let rules = resolve_rules(&spec, &indexes, &mut errors);

    if !errors.is_empty() {
        return Err(RosterError::Reference(errors));
    }

    let work_shifts = shifts
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_work)
        .map(|(i, _)| i)
        .collect();
    let objective_weight = spec.objective.terms.first().map(|t| t.weight).unwrap_or(1);

    Ok(NormalizedSpec {
        employees: spec.sets.employees,
        days: spec.sets.days,
        shifts,
        sites: spec.sets.sites,
        emp_skills,
        emp_site,
        rest_shift,
        work_shifts,
        demand,
        rules,
        objective_weight,
    })
}

fn build_indexes(spec: &Spec, errors: &mut Vec<String>) -> Indexes {
    fn index_of(ids: &[String], section: &str, errors: &mut Vec<String>) -> HashMap<String, usize> {
        let mut map = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if map.insert(id.clone(), i).is_some() {
                errors.push(format!("sets.{section}: duplicate id `{id}`"));
            }
        }
        map
    }

    let mut days = HashMap::with_capacity(spec.sets.days.len());
    for (i, day) in spec.sets.days.iter().enumerate() {
        let _ = days.insert(*day, i);
    }

    Indexes {
        employees: index_of(&spec.sets.employees, "employees", errors),
        days,
        shifts: index_of(&spec.sets.shifts, "shifts", errors),
        sites: index_of(&spec.sets.sites, "sites", errors),
    }
}

fn check_day_order(spec: &Spec, errors: &mut Vec<String>) {
    for pair in spec.sets.days.windows(2) {
        if pair[0] >= pair[1] {
            errors.push(format!(
                "sets.days: not strictly increasing at `{}` -> `{}`",
                pair[0], pair[1]
            ));
        }
    }
}

fn resolve_shifts(spec: &Spec, errors: &mut Vec<String>) -> Vec<ShiftInfo> {
    for label in spec.shifts.keys() {
        if !spec.sets.shifts.contains(label) {
            errors.push(format!("shifts.{label}: not declared in sets.shifts"));
        }
    }

    spec.sets
        .shifts
        .iter()
        .map(|label| {
            let Some(def) = spec.shifts.get(label) else {
                errors.push(format!("shifts: missing definition for `{label}`"));
                return ShiftInfo {
                    label: label.clone(),
                    minutes: 0,
                    is_work: false,
                    start_min: 0,
                    end_abs_min: 0,
                };
            };
            if label == REST_SHIFT && !def.is_rest_shape() {
                errors.push(format!(
                    "shifts.{REST_SHIFT}: rest label must be {{\"00:00\",\"00:00\",0,false}}"
                ));
            }
            let start_min = clock_minutes(&def.start).unwrap_or(0);
            let end_min = clock_minutes(&def.end).unwrap_or(0);
            // An end at or before the start is an overnight shift ending on
            // the following calendar day.
            let end_abs_min = if def.is_work && end_min <= start_min {
                end_min + 24 * 60
            } else {
                end_min
            };
            ShiftInfo {
                label: label.clone(),
                minutes: def.minutes,
                is_work: def.is_work,
                start_min,
                end_abs_min,
            }
        })
        .collect()
}

fn resolve_employees(
    spec: &Spec,
    indexes: &Indexes,
    errors: &mut Vec<String>,
) -> (Vec<BTreeSet<String>>, Vec<Option<usize>>) {
    for id in spec.employees.keys() {
        if !indexes.employees.contains_key(id) {
            errors.push(format!("employees.{id}: not declared in sets.employees"));
        }
    }

    let mut skills = Vec::with_capacity(spec.sets.employees.len());
    let mut sites = Vec::with_capacity(spec.sets.employees.len());
    for id in &spec.sets.employees {
        let Some(def) = spec.employees.get(id) else {
            errors.push(format!("employees: missing definition for `{id}`"));
            skills.push(BTreeSet::new());
            sites.push(None);
            continue;
        };
        skills.push(def.skills.clone());
        sites.push(match &def.site_home {
            Some(site) => {
                let resolved = indexes.sites.get(site).copied();
                if resolved.is_none() {
                    errors.push(format!("employees.{id}.site_home: unknown site `{site}`"));
                }
                resolved
            }
            None => None,
        });
    }
    (skills, sites)
}

fn resolve_demand(
    spec: &Spec,
    indexes: &Indexes,
    emp_site: &[Option<usize>],
    errors: &mut Vec<String>,
) -> Vec<NormalizedDemand> {
    spec.demand
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let path = format!("demand[{i}]");
            let day = indexes.days.get(&entry.day).copied().unwrap_or_else(|| {
                errors.push(format!("{path}.day: `{}` is not in sets.days", entry.day));
                0
            });
            let site = indexes.sites.get(&entry.site).copied().unwrap_or_else(|| {
                errors.push(format!("{path}.site: unknown site `{}`", entry.site));
                0
            });
            let shift = match indexes.shifts.get(&entry.shift).copied() {
                Some(s) => {
                    let is_work = spec.shifts.get(&entry.shift).map(|d| d.is_work).unwrap_or(false);
                    if !is_work {
                        errors.push(format!(
                            "{path}.shift: `{}` is not a work shift",
                            entry.shift
                        ));
                    }
                    s
                }
                None => {
                    errors.push(format!("{path}.shift: unknown shift `{}`", entry.shift));
                    0
                }
            };
            let bounds = match (entry.eq, entry.min, entry.max) {
                (Some(eq), _, _) => DemandBounds::Exactly(eq),
                (None, Some(min), Some(max)) => {
                    if min > max {
                        errors.push(format!("{path}: min {min} exceeds max {max}"));
                    }
                    DemandBounds::Between(min, max)
                }
                _ => {
                    errors.push(format!("{path}: expected `eq` or both `min` and `max`"));
                    DemandBounds::Exactly(0)
                }
            };
            let skills_min = entry
                .requirements
                .as_ref()
                .map(|r| r.skills_min.iter().map(|s| (s.skill.clone(), s.min)).collect())
                .unwrap_or_default();
            let eligible = (0..spec.sets.employees.len())
                .filter(|&e| emp_site.get(e).copied().flatten().map_or(true, |home| home == site))
                .collect();
            NormalizedDemand {
                day,
                site,
                shift,
                bounds,
                skills_min,
                eligible,
            }
        })
        .collect()
}

// ----------------------------------------------------------------------
// Rule resolution
// ----------------------------------------------------------------------

struct RuleCx<'a> {
    indexes: &'a Indexes,
    spec: &'a Spec,
    path: String,
    errors: &'a mut Vec<String>,
}

impl RuleCx<'_> {
    fn error(&mut self, message: String) {
        self.errors.push(format!("{}: {message}", self.path));
    }

    fn uint(&mut self, options: &serde_json::Map<String, Value>, key: &str) -> u32 {
        match options.get(key).and_then(Value::as_u64) {
            Some(n) => u32::try_from(n).unwrap_or_else(|_| {
                self.error(format!("`{key}` out of range"));
                0
            }),
            None => {
                self.error(format!("missing option `{key}`"));
                0
            }
        }
    }

    fn window(&mut self, options: &serde_json::Map<String, Value>) -> usize {
        let days = self.uint(options, "window_days") as usize;
        if days == 0 {
            self.error("`window_days` must be at least 1".to_string());
            return 1;
        }
        days
    }

    fn literal(&mut self, options: &serde_json::Map<String, Value>, key: &str, expected: &str) {
        if let Some(value) = options.get(key).and_then(Value::as_str) {
            if value != expected {
                self.error(format!("unsupported `{key}` `{value}` (only `{expected}`)"));
            }
        }
    }

    fn shift_list(&mut self, options: &serde_json::Map<String, Value>, key: &str) -> Vec<usize> {
        let Some(items) = options.get(key).and_then(Value::as_array) else {
            self.error(format!("missing option `{key}`"));
            return Vec::new();
        };
        let mut shifts = Vec::with_capacity(items.len());
        for item in items {
            let Some(label) = item.as_str() else { continue };
            match self.indexes.shifts.get(label) {
                Some(&s) => shifts.push(s),
                None => self.error(format!("`{key}`: unknown shift `{label}`")),
            }
        }
        shifts.sort_unstable();
        shifts.dedup();
        shifts
    }

    fn day_list(&mut self, options: &serde_json::Map<String, Value>, key: &str) -> Vec<usize> {
        let Some(items) = options.get(key).and_then(Value::as_array) else {
            self.error(format!("missing option `{key}`"));
            return Vec::new();
        };
        let mut days = Vec::with_capacity(items.len());
        for item in items {
            let Some(text) = item.as_str() else { continue };
            match crate::spec::parse_day(text).and_then(|d| self.indexes.days.get(&d).copied()) {
                Some(d) => days.push(d),
                None => self.error(format!("`{key}`: `{text}` is not in sets.days")),
            }
        }
        days.sort_unstable();
        days.dedup();
        days
    }

    fn shift_ref(&mut self, value: Option<&Value>, key: &str) -> Option<usize> {
        let label = value.and_then(Value::as_str)?;
        let resolved = self.indexes.shifts.get(label).copied();
        if resolved.is_none() {
            self.error(format!("`{key}`: unknown shift `{label}`"));
        }
        resolved
    }
}

fn resolve_rules(spec: &Spec, indexes: &Indexes, errors: &mut Vec<String>) -> Vec<Rule> {
    let mut rules = Vec::with_capacity(spec.constraints.len());
    for (i, entry) in spec.constraints.iter().enumerate() {
        let path = format!("constraints[{i}]");
        let mut cx = RuleCx {
            indexes,
            spec,
            path: path.clone(),
            errors,
        };

        let scope = expand_scope(entry.scope.as_ref(), &mut cx);
        let weight = entry.penalty.as_ref().map(|p| p.weight);
        let options = &entry.options;

        let body = match entry.kind.as_str() {
            "exactly_one_assignment_per_day" => {
                let shifts = cx.shift_list(options, "shifts");
                if shifts.len() != spec.sets.shifts.len() {
                    cx.error("`shifts` must name every label in sets.shifts".to_string());
                }
                Some(RuleBody::Hard(HardRule::ExactlyOneAssignmentPerDay))
            }
            "forbid_shift_sequences" => {
                let mut sequences = Vec::new();
                if let Some(items) = options.get("sequences").and_then(Value::as_array) {
                    for item in items {
                        let map = item.as_object();
                        let prev = cx.shift_ref(map.and_then(|m| m.get("prev_shift")), "sequences");
                        let next = cx.shift_ref(map.and_then(|m| m.get("next_shift")), "sequences");
                        if let (Some(prev), Some(next)) = (prev, next) {
                            sequences.push((prev, next));
                        }
                    }
                } else {
                    cx.error("missing option `sequences`".to_string());
                }
                Some(RuleBody::Hard(HardRule::ForbidShiftSequences { sequences }))
            }
            "max_shifts_in_window" => {
                cx.literal(options, "mode", "rolling");
                Some(RuleBody::Hard(HardRule::MaxShiftsInWindow {
                    window_days: cx.window(options),
                    shifts: cx.shift_list(options, "shifts"),
                    max: cx.uint(options, "max"),
                }))
            }
            "min_rest_minutes_between_shifts" => {
                Some(RuleBody::Hard(HardRule::MinRestMinutesBetweenShifts {
                    minutes: cx.uint(options, "minutes"),
                }))
            }
            "max_work_minutes_in_window" => {
                Some(RuleBody::Hard(HardRule::MaxWorkMinutesInWindow {
                    window_days: cx.window(options),
                    max_minutes: cx.uint(options, "max"),
                }))
            }
            "max_consecutive_work_days" => Some(RuleBody::Hard(HardRule::MaxConsecutiveWorkDays {
                max: cx.uint(options, "max") as usize,
            })),
            "min_consecutive_days_off" => Some(RuleBody::Hard(HardRule::MinConsecutiveDaysOff {
                min: cx.uint(options, "min") as usize,
            })),
            "penalize_work_on_days" => soft_body(
                SoftRule::PenalizeWorkOnDays {
                    days: cx.day_list(options, "days"),
                },
                weight,
                &mut cx,
            ),
            "penalize_work_on_shifts" => soft_body(
                SoftRule::PenalizeWorkOnShifts {
                    shifts: cx.shift_list(options, "shifts"),
                },
                weight,
                &mut cx,
            ),
            "penalize_unmet_day_off_requests" => {
                let requests = resolve_requests(options, &mut cx);
                soft_body(SoftRule::PenalizeUnmetDayOffRequests { requests }, weight, &mut cx)
            }
            "fair_distribution" => {
                cx.literal(options, "measure", "count");
                cx.literal(options, "target", "auto_mean");
                cx.literal(options, "penalize", "absolute_deviation");
                soft_body(
                    SoftRule::FairDistribution {
                        shifts: cx.shift_list(options, "shifts"),
                        window_days: cx.window(options),
                    },
                    weight,
                    &mut cx,
                )
            }
            other => {
                cx.error(format!("unrecognized kind `{other}`"));
                None
            }
        };

        if let Some(body) = body {
            let scope = match &body {
                RuleBody::Soft {
                    rule: SoftRule::PenalizeUnmetDayOffRequests { requests },
                    ..
                } => {
                    let mut employees: Vec<usize> = requests.iter().map(|&(e, _)| e).collect();
                    employees.sort_unstable();
                    employees.dedup();
                    employees
                }
                _ => scope,
            };
            rules.push(Rule {
                id: entry.id.clone().unwrap_or_else(|| entry.kind.clone()),
                scope,
                body,
            });
        }
    }
    rules
}

fn soft_body(rule: SoftRule, weight: Option<u32>, cx: &mut RuleCx<'_>) -> Option<RuleBody> {
    match weight {
        Some(weight) => Some(RuleBody::Soft { rule, weight }),
        None => {
            cx.error("missing `penalty.weight`".to_string());
            None
        }
    }
}

fn resolve_requests(
    options: &serde_json::Map<String, Value>,
    cx: &mut RuleCx<'_>,
) -> Vec<(usize, usize)> {
    let Some(items) = options.get("requests").and_then(Value::as_array) else {
        cx.error("missing option `requests`".to_string());
        return Vec::new();
    };
    let mut requests = Vec::with_capacity(items.len());
    for item in items {
        let Some(map) = item.as_object() else { continue };
        let employee = map.get("employee").and_then(Value::as_str).and_then(|id| {
            let resolved = cx.indexes.employees.get(id).copied();
            if resolved.is_none() {
                cx.error(format!("`requests`: unknown employee `{id}`"));
            }
            resolved
        });
        let day = map
            .get("day")
            .and_then(Value::as_str)
            .and_then(crate::spec::parse_day)
            .and_then(|d| {
                let resolved = cx.indexes.days.get(&d).copied();
                if resolved.is_none() {
                    cx.error(format!("`requests`: day `{d}` is not in sets.days"));
                }
                resolved
            });
        if let (Some(employee), Some(day)) = (employee, day) {
            requests.push((employee, day));
        }
    }
    requests
}

fn expand_scope(scope: Option<&crate::spec::Scope>, cx: &mut RuleCx<'_>) -> Vec<usize> {
    match scope.map(|s| &s.employees) {
        Some(ScopeEmployees::All(_)) | None => (0..cx.spec.sets.employees.len()).collect(),
        Some(ScopeEmployees::Ids(ids)) => {
            let mut employees = Vec::with_capacity(ids.len());
            for id in ids {
                match cx.indexes.employees.get(id) {
                    Some(&e) => employees.push(e),
                    None => cx.error(format!("scope: unknown employee `{id}`")),
                }
            }
            employees.sort_unstable();
            employees.dedup();
            employees
        }
    }
}
