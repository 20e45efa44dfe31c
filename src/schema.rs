//! Declarative schema validation for spec documents.
//!
//! Checks the wire shape only: required fields, primitive types, the
//! `YYYY-MM-DD` and `HH:MM` patterns, the `eq` vs `min`/`max` collision and
//! unknown keys. Cross-reference resolution lives in [`crate::normalize`].
//!
//! Every violation is collected; callers get the full report in one pass.

use serde_json::{Map, Value};

use crate::spec::{clock_minutes, parse_day};

/// Outcome of a schema pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

const TOP_LEVEL_KEYS: &[&str] = &["sets", "shifts", "employees", "demand", "constraints", "objective"];

/// Recognized option keys per hard rule kind.
const HARD_KIND_OPTIONS: &[(&str, &[&str])] = &[
    ("exactly_one_assignment_per_day", &["shifts"]),
    ("forbid_shift_sequences", &["sequences"]),
    ("max_shifts_in_window", &["window_days", "shifts", "max", "mode"]),
    ("min_rest_minutes_between_shifts", &["minutes"]),
    ("max_work_minutes_in_window", &["window_days", "max"]),
    ("max_consecutive_work_days", &["max"]),
    ("min_consecutive_days_off", &["min"]),
];

/// Recognized option keys per soft rule kind.
const SOFT_KIND_OPTIONS: &[(&str, &[&str])] = &[
    ("penalize_work_on_days", &["days"]),
    ("penalize_work_on_shifts", &["shifts"]),
    ("penalize_unmet_day_off_requests", &["requests"]),
    ("fair_distribution", &["measure", "shifts", "window_days", "target", "penalize"]),
];

/// Looks up a recognized rule kind. Returns its option keys and whether the
/// kind is soft.
pub fn rule_kind_options(kind: &str) -> Option<(&'static [&'static str], bool)> {
    HARD_KIND_OPTIONS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, opts)| (*opts, false))
        .or_else(|| {
            SOFT_KIND_OPTIONS
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, opts)| (*opts, true))
        })
}

/// Validates a spec document against the declarative schema, reporting all
/// violations rather than stopping at the first.
pub fn validate(doc: &Value) -> SchemaReport {
    let mut checker = Checker::default();
    checker.check_document(doc);
    SchemaReport {
        valid: checker.errors.is_empty(),
        errors: checker.errors,
    }
}

#[derive(Default)]
struct Checker {
    errors: Vec<String>,
}

impl Checker {
    fn error(&mut self, path: &str, message: &str) {
        self.errors.push(format!("{path}: {message}"));
    }

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(map) => Some(map),
            None => {
                self.error(path, "expected object");
                None
            }
        }
    }

    fn array<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
        match value.as_array() {
            Some(items) => Some(items),
            None => {
                self.error(path, "expected array");
                None
            }
        }
    }

    fn string<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a str> {
        match value.as_str() {
            Some(text) => Some(text),
            None => {
                self.error(path, "expected string");
                None
            }
        }
    }

    fn uint(&mut self, value: &Value, path: &str) -> Option<u64> {
        match value.as_u64() {
            Some(n) => Some(n),
            None => {
                self.error(path, "expected non-negative integer");
                None
            }
        }
    }

    fn boolean(&mut self, value: &Value, path: &str) -> Option<bool> {
        match value.as_bool() {
            Some(b) => Some(b),
            None => {
                self.error(path, "expected boolean");
                None
            }
        }
    }

    fn day(&mut self, value: &Value, path: &str) {
        if let Some(text) = self.string(value, path) {
            if parse_day(text).is_none() {
                self.error(path, "expected date in YYYY-MM-DD form");
            }
        }
    }

    fn clock(&mut self, value: &Value, path: &str) {
        if let Some(text) = self.string(value, path) {
            if clock_minutes(text).is_none() {
                self.error(path, "expected time in HH:MM form");
            }
        }
    }

    fn require<'a>(&mut self, map: &'a Map<String, Value>, key: &str, path: &str) -> Option<&'a Value> {
        match map.get(key) {
            Some(value) => Some(value),
            None => {
                self.error(path, &format!("missing required field `{key}`"));
                None
            }
        }
    }

    fn reject_unknown_keys(&mut self, map: &Map<String, Value>, allowed: &[&str], path: &str) {
        for key in map.keys() {
            if !allowed.contains(&key.as_str()) {
                self.error(path, &format!("unknown key `{key}`"));
            }
        }
    }

    fn string_array(&mut self, value: &Value, path: &str) {
        if let Some(items) = self.array(value, path) {
            for (i, item) in items.iter().enumerate() {
                self.string(item, &format!("{path}[{i}]"));
            }
        }
    }

    // ------------------------------------------------------------------
    // Document sections
    // ------------------------------------------------------------------

    fn check_document(&mut self, doc: &Value) {
        let Some(root) = self.object(doc, "spec") else {
            return;
        };
        self.reject_unknown_keys(root, TOP_LEVEL_KEYS, "spec");
        if let Some(sets) = self.require(root, "sets", "spec") {
            self.check_sets(sets);
        }
        if let Some(shifts) = self.require(root, "shifts", "spec") {
            self.check_shifts(shifts);
        }
        if let Some(employees) = self.require(root, "employees", "spec") {
            self.check_employees(employees);
        }
        if let Some(demand) = self.require(root, "demand", "spec") {
            self.check_demand(demand);
        }
        if let Some(constraints) = self.require(root, "constraints", "spec") {
            self.check_constraints(constraints);
        }
        if let Some(objective) = self.require(root, "objective", "spec") {
            self.check_objective(objective);
        }
    }

    fn check_sets(&mut self, value: &Value) {
        let Some(sets) = self.object(value, "sets") else {
            return;
        };
        self.reject_unknown_keys(sets, &["employees", "days", "shifts", "sites"], "sets");
        if let Some(employees) = self.require(sets, "employees", "sets") {
            self.string_array(employees, "sets.employees");
        }
        if let Some(days) = self.require(sets, "days", "sets") {
            if let Some(items) = self.array(days, "sets.days") {
                for (i, item) in items.iter().enumerate() {
                    self.day(item, &format!("sets.days[{i}]"));
                }
            }
        }
        if let Some(shifts) = self.require(sets, "shifts", "sets") {
            self.string_array(shifts, "sets.shifts");
        }
        if let Some(sites) = self.require(sets, "sites", "sets") {
            self.string_array(sites, "sets.sites");
        }
    }

    fn check_shifts(&mut self, value: &Value) {
        let Some(shifts) = self.object(value, "shifts") else {
            return;
        };
        for (label, def) in shifts {
            let path = format!("shifts.{label}");
            let Some(map) = self.object(def, &path) else {
                continue;
            };
            self.reject_unknown_keys(map, &["start", "end", "minutes", "is_work"], &path);
            if let Some(start) = self.require(map, "start", &path) {
                self.clock(start, &format!("{path}.start"));
            }
            if let Some(end) = self.require(map, "end", &path) {
                self.clock(end, &format!("{path}.end"));
            }
            if let Some(minutes) = self.require(map, "minutes", &path) {
                self.uint(minutes, &format!("{path}.minutes"));
            }
            if let Some(is_work) = self.require(map, "is_work", &path) {
                self.boolean(is_work, &format!("{path}.is_work"));
            }
        }
    }

    fn check_employees(&mut self, value: &Value) {
        let Some(employees) = self.object(value, "employees") else {
            return;
        };
        for (id, def) in employees {
            let path = format!("employees.{id}");
            let Some(map) = self.object(def, &path) else {
                continue;
            };
            self.reject_unknown_keys(map, &["skills", "roles", "site_home", "contract"], &path);
            if let Some(skills) = self.require(map, "skills", &path) {
                self.string_array(skills, &format!("{path}.skills"));
            }
            if let Some(roles) = self.require(map, "roles", &path) {
                self.string_array(roles, &format!("{path}.roles"));
            }
            if let Some(site_home) = map.get("site_home") {
                self.string(site_home, &format!("{path}.site_home"));
            }
            if let Some(contract) = self.require(map, "contract", &path) {
                let contract_path = format!("{path}.contract");
                if let Some(contract_map) = self.object(contract, &contract_path) {
                    self.reject_unknown_keys(contract_map, &["type"], &contract_path);
                    if let Some(kind) = self.require(contract_map, "type", &contract_path) {
                        self.string(kind, &format!("{contract_path}.type"));
                    }
                }
            }
        }
    }

    fn check_demand(&mut self, value: &Value) {
        let Some(entries) = self.array(value, "demand") else {
            return;
        };
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("demand[{i}]");
            let Some(map) = self.object(entry, &path) else {
                continue;
            };
            self.reject_unknown_keys(
                map,
                &["day", "site", "shift", "eq", "min", "max", "requirements"],
                &path,
            );
            if let Some(day) = self.require(map, "day", &path) {
                self.day(day, &format!("{path}.day"));
            }
            if let Some(site) = self.require(map, "site", &path) {
                self.string(site, &format!("{path}.site"));
            }
            if let Some(shift) = self.require(map, "shift", &path) {
                self.string(shift, &format!("{path}.shift"));
            }
            let has_eq = map.contains_key("eq");
            let has_min = map.contains_key("min");
            let has_max = map.contains_key("max");
            if has_eq && (has_min || has_max) {
                self.error(&path, "`eq` is mutually exclusive with `min`/`max`");
            } else if !has_eq && !(has_min && has_max) {
                self.error(&path, "expected `eq` or both `min` and `max`");
            }
            for key in ["eq", "min", "max"] {
                if let Some(bound) = map.get(key) {
                    self.uint(bound, &format!("{path}.{key}"));
                }
            }
            if let Some(requirements) = map.get("requirements") {
                self.check_requirements(requirements, &format!("{path}.requirements"));
            }
        }
    }

    fn check_requirements(&mut self, value: &Value, path: &str) {
        let Some(map) = self.object(value, path) else {
            return;
        };
        self.reject_unknown_keys(map, &["skills_min"], path);
        let Some(skills_min) = self.require(map, "skills_min", path) else {
            return;
        };
        let skills_path = format!("{path}.skills_min");
        let Some(items) = self.array(skills_min, &skills_path) else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{skills_path}[{i}]");
            let Some(item_map) = self.object(item, &item_path) else {
                continue;
            };
            self.reject_unknown_keys(item_map, &["skill", "min"], &item_path);
            if let Some(skill) = self.require(item_map, "skill", &item_path) {
                self.string(skill, &format!("{item_path}.skill"));
            }
            if let Some(min) = self.require(item_map, "min", &item_path) {
                self.uint(min, &format!("{item_path}.min"));
            }
        }
    }

    fn check_constraints(&mut self, value: &Value) {
        let Some(entries) = self.array(value, "constraints") else {
            return;
        };
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("constraints[{i}]");
            let Some(map) = self.object(entry, &path) else {
                continue;
            };
            if let Some(id) = map.get("id") {
                self.string(id, &format!("{path}.id"));
            }
            let Some(kind) = self
                .require(map, "kind", &path)
                .and_then(|k| self.string(k, &format!("{path}.kind")))
                .map(str::to_string)
            else {
                continue;
            };
            // Unknown kinds are a reference violation reported by the
            // normalizer; option keys can only be checked for known kinds.
            let Some((options, soft)) = rule_kind_options(&kind) else {
                continue;
            };
            let mut allowed: Vec<&str> = vec!["id", "kind", "scope"];
            if soft {
                allowed.push("penalty");
            }
            allowed.extend_from_slice(options);
            self.reject_unknown_keys(map, &allowed, &path);

            let scoped = kind != "penalize_unmet_day_off_requests";
            if scoped {
                if let Some(scope) = self.require(map, "scope", &path) {
                    self.check_scope(scope, &format!("{path}.scope"));
                }
            } else if map.contains_key("scope") {
                self.error(&path, "`scope` is implicit in the request list");
            }
            if soft {
                if let Some(penalty) = self.require(map, "penalty", &path) {
                    let penalty_path = format!("{path}.penalty");
                    if let Some(penalty_map) = self.object(penalty, &penalty_path) {
                        self.reject_unknown_keys(penalty_map, &["weight"], &penalty_path);
                        if let Some(weight) = self.require(penalty_map, "weight", &penalty_path) {
                            self.uint(weight, &format!("{penalty_path}.weight"));
                        }
                    }
                }
            }
            self.check_rule_options(&kind, map, &path);
        }
    }

    fn check_scope(&mut self, value: &Value, path: &str) {
        let Some(map) = self.object(value, path) else {
            return;
        };
        self.reject_unknown_keys(map, &["employees"], path);
        let Some(employees) = self.require(map, "employees", path) else {
            return;
        };
        let employees_path = format!("{path}.employees");
        match employees {
            Value::String(text) => {
                if text != "ALL" {
                    self.error(&employees_path, "expected `ALL` or an id list");
                }
            }
            Value::Array(_) => self.string_array(employees, &employees_path),
            _ => self.error(&employees_path, "expected `ALL` or an id list"),
        }
    }

    fn check_rule_options(&mut self, kind: &str, map: &Map<String, Value>, path: &str) {
        match kind {
            "exactly_one_assignment_per_day" => {
                if let Some(shifts) = self.require(map, "shifts", path) {
                    self.string_array(shifts, &format!("{path}.shifts"));
                }
            }
            "forbid_shift_sequences" => {
                if let Some(sequences) = self.require(map, "sequences", path) {
                    let sequences_path = format!("{path}.sequences");
                    if let Some(items) = self.array(sequences, &sequences_path) {
                        for (i, item) in items.iter().enumerate() {
                            let item_path = format!("{sequences_path}[{i}]");
                            let Some(item_map) = self.object(item, &item_path) else {
                                continue;
                            };
                            self.reject_unknown_keys(item_map, &["prev_shift", "next_shift"], &item_path);
                            if let Some(prev) = self.require(item_map, "prev_shift", &item_path) {
                                self.string(prev, &format!("{item_path}.prev_shift"));
                            }
                            if let Some(next) = self.require(item_map, "next_shift", &item_path) {
                                self.string(next, &format!("{item_path}.next_shift"));
                            }
                        }
                    }
                }
            }
            "max_shifts_in_window" => {
                if let Some(window) = self.require(map, "window_days", path) {
                    self.uint(window, &format!("{path}.window_days"));
                }
                if let Some(shifts) = self.require(map, "shifts", path) {
                    self.string_array(shifts, &format!("{path}.shifts"));
                }
                if let Some(max) = self.require(map, "max", path) {
                    self.uint(max, &format!("{path}.max"));
                }
                if let Some(mode) = map.get("mode") {
                    self.string(mode, &format!("{path}.mode"));
                }
            }
            "min_rest_minutes_between_shifts" => {
                if let Some(minutes) = self.require(map, "minutes", path) {
                    self.uint(minutes, &format!("{path}.minutes"));
                }
            }
            "max_work_minutes_in_window" => {
                if let Some(window) = self.require(map, "window_days", path) {
                    self.uint(window, &format!("{path}.window_days"));
                }
                if let Some(max) = self.require(map, "max", path) {
                    self.uint(max, &format!("{path}.max"));
                }
            }
            "max_consecutive_work_days" => {
                if let Some(max) = self.require(map, "max", path) {
                    self.uint(max, &format!("{path}.max"));
                }
            }
            "min_consecutive_days_off" => {
                if let Some(min) = self.require(map, "min", path) {
                    self.uint(min, &format!("{path}.min"));
                }
            }
            "penalize_work_on_days" => {
                if let Some(days) = self.require(map, "days", path) {
                    let days_path = format!("{path}.days");
                    if let Some(items) = self.array(days, &days_path) {
                        for (i, item) in items.iter().enumerate() {
                            self.day(item, &format!("{days_path}[{i}]"));
                        }
                    }
                }
            }
            "penalize_work_on_shifts" => {
                if let Some(shifts) = self.require(map, "shifts", path) {
                    self.string_array(shifts, &format!("{path}.shifts"));
                }
            }
            "penalize_unmet_day_off_requests" => {
                if let Some(requests) = self.require(map, "requests", path) {
                    let requests_path = format!("{path}.requests");
                    if let Some(items) = self.array(requests, &requests_path) {
                        for (i, item) in items.iter().enumerate() {
                            let item_path = format!("{requests_path}[{i}]");
                            let Some(item_map) = self.object(item, &item_path) else {
                                continue;
                            };
                            self.reject_unknown_keys(item_map, &["employee", "day"], &item_path);
                            if let Some(employee) = self.require(item_map, "employee", &item_path) {
                                self.string(employee, &format!("{item_path}.employee"));
                            }
                            if let Some(day) = self.require(item_map, "day", &item_path) {
                                self.day(day, &format!("{item_path}.day"));
                            }
                        }
                    }
                }
            }
            "fair_distribution" => {
                if let Some(shifts) = self.require(map, "shifts", path) {
                    self.string_array(shifts, &format!("{path}.shifts"));
                }
                if let Some(window) = self.require(map, "window_days", path) {
                    self.uint(window, &format!("{path}.window_days"));
                }
                for key in ["measure", "target", "penalize"] {
                    if let Some(option) = map.get(key) {
                        self.string(option, &format!("{path}.{key}"));
                    }
                }
            }
            _ => {}
        }
    }

    fn check_objective(&mut self, value: &Value) {
        let Some(map) = self.object(value, "objective") else {
            return;
        };
        self.reject_unknown_keys(map, &["mode", "terms"], "objective");
        if let Some(mode) = self.require(map, "mode", "objective") {
            if let Some(text) = self.string(mode, "objective.mode") {
                if text != "minimize" {
                    self.error("objective.mode", "expected `minimize`");
                }
            }
        }
        let Some(terms) = self.require(map, "terms", "objective") else {
            return;
        };
        let Some(items) = self.array(terms, "objective.terms") else {
            return;
        };
        if items.len() != 1 {
            self.error("objective.terms", "expected exactly one term");
        }
        for (i, item) in items.iter().enumerate() {
            let path = format!("objective.terms[{i}]");
            let Some(term) = self.object(item, &path) else {
                continue;
            };
            self.reject_unknown_keys(term, &["kind", "weight"], &path);
            if let Some(kind) = self.require(term, "kind", &path) {
                if let Some(text) = self.string(kind, &format!("{path}.kind")) {
                    if text != "soft_penalties_total" {
                        self.error(&format!("{path}.kind"), "expected `soft_penalties_total`");
                    }
                }
            }
            if let Some(weight) = self.require(term, "weight", &path) {
                self.uint(weight, &format!("{path}.weight"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::{self, DemoData};
    use serde_json::json;

    #[test]
    fn demo_spec_is_schema_valid() {
        let report = validate(&demo_data::generate(DemoData::Small));
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn reports_all_violations_in_one_pass() {
        let doc = json!({
            "sets": {"employees": ["P1"], "days": ["2026-03-2"], "shifts": ["OFF"], "sites": []},
            "shifts": {"OFF": {"start": "00:00", "end": "00:00", "minutes": -1, "is_work": false}},
            "employees": {},
            "demand": [],
            "constraints": [],
            "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]},
            "extra": true
        });
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("sets.days[0]")));
        assert!(report.errors.iter().any(|e| e.contains("shifts.OFF.minutes")));
        assert!(report.errors.iter().any(|e| e.contains("unknown key `extra`")));
        assert!(report.errors.len() >= 3);
    }

    #[test]
    fn rejects_missing_top_level_sections() {
        let report = validate(&json!({"sets": {}}));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("missing required field `objective`")));
        assert!(report.errors.iter().any(|e| e.contains("missing required field `shifts`")));
    }

    #[test]
    fn rejects_eq_with_min_max_collision() {
        // The first demo entry already carries min/max.
        let mut doc = demo_data::generate(DemoData::Small);
        doc["demand"][0]["eq"] = json!(1);
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("mutually exclusive")));
    }

    #[test]
    fn rejects_demand_without_bounds() {
        let mut doc = demo_data::generate(DemoData::Small);
        let entry = doc["demand"][0].as_object_mut().unwrap();
        let _ = entry.remove("min");
        let _ = entry.remove("max");
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("expected `eq` or both")));
    }

    #[test]
    fn rejects_unknown_rule_option_key() {
        let mut doc = demo_data::generate(DemoData::Small);
        doc["constraints"][0]["surprise"] = json!(1);
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("unknown key `surprise`")));
    }

    #[test]
    fn rejects_malformed_scope() {
        let mut doc = demo_data::generate(DemoData::Small);
        doc["constraints"][0]["scope"] = json!({"employees": "EVERYONE"});
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("expected `ALL` or an id list")));
    }

    #[test]
    fn rejects_penalty_on_hard_rules_and_requires_it_on_soft() {
        let doc = json!({
            "sets": {"employees": ["P1"], "days": ["2026-03-02"], "shifts": ["M", "OFF"], "sites": ["A"]},
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            },
            "employees": {"P1": {"skills": [], "roles": [], "contract": {"type": "full_time"}}},
            "demand": [],
            "constraints": [
                {"kind": "max_consecutive_work_days", "scope": {"employees": "ALL"}, "max": 5,
                 "penalty": {"weight": 1}},
                {"kind": "penalize_work_on_shifts", "scope": {"employees": "ALL"}, "shifts": ["M"]}
            ],
            "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
        });
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("constraints[0]") && e.contains("`penalty`")));
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("constraints[1]") && e.contains("missing required field `penalty`")));
    }

    #[test]
    fn objective_shape_is_fixed() {
        let mut doc = demo_data::generate(DemoData::Small);
        doc["objective"]["mode"] = json!("maximize");
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("objective.mode")));

        let mut doc = demo_data::generate(DemoData::Small);
        doc["objective"]["terms"] = json!([]);
        let report = validate(&doc);
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("objective.terms")));
    }
}
