//! Typed model of the roster spec document.
//!
//! The wire format is JSON. Documents are first checked against the
//! declarative schema in [`crate::schema`] and then deserialized into these
//! types by [`crate::normalize`], so the types mirror the wire shape
//! one-to-one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// The distinguished rest label. Must be present in `sets.shifts`.
pub const REST_SHIFT: &str = "OFF";

/// A roster spec document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub sets: Sets,
    pub shifts: BTreeMap<String, ShiftDef>,
    pub employees: BTreeMap<String, EmployeeDef>,
    pub demand: Vec<DemandEntry>,
    pub constraints: Vec<RuleEntry>,
    pub objective: Objective,
}

/// Identifier sets. Order is significant: scopes, schedule views and the
/// flat report are all sorted by the order declared here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sets {
    pub employees: Vec<String>,
    pub days: Vec<NaiveDate>,
    pub shifts: Vec<String>,
    pub sites: Vec<String>,
}

/// A shift template. `minutes` is authoritative; `start`/`end` are clock
/// times used only for rest-gap computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftDef {
    pub start: String,
    pub end: String,
    pub minutes: u32,
    pub is_work: bool,
}

impl ShiftDef {
    /// The exact shape required for the rest label.
    pub fn rest() -> Self {
        Self {
            start: "00:00".to_string(),
            end: "00:00".to_string(),
            minutes: 0,
            is_work: false,
        }
    }

    pub fn is_rest_shape(&self) -> bool {
        self.start == "00:00" && self.end == "00:00" && self.minutes == 0 && !self.is_work
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeDef {
    pub skills: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    /// Absent means the employee is eligible for every site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_home: Option<String>,
    pub contract: Contract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    #[serde(rename = "type")]
    pub kind: String,
}

/// Required headcount at a (day, site, shift). `eq` and `min`/`max` are
/// mutually exclusive; bounds are inclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandEntry {
    pub day: NaiveDate,
    pub site: String,
    pub shift: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub skills_min: Vec<SkillMin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMin {
    pub skill: String,
    pub min: u32,
}

/// A rule entry as written in the document. Kind-specific options stay as
/// raw JSON here; [`crate::normalize`] turns them into the closed typed
/// catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Penalty>,
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub employees: ScopeEmployees,
}

/// `"ALL"` or an explicit id list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeEmployees {
    All(String),
    Ids(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Penalty {
    pub weight: u32,
}

/// Fixed shape: `minimize` over the single `soft_penalties_total` term.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub mode: String,
    pub terms: Vec<ObjectiveTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectiveTerm {
    pub kind: String,
    pub weight: u32,
}

/// Parses an `HH:MM` clock time into minutes since midnight.
pub fn clock_minutes(text: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(text, "%H:%M").ok()?;
    // Reject trailing garbage that chrono would tolerate, e.g. "7:5".
    if text.len() != 5 || text.as_bytes()[2] != b':' {
        return None;
    }
    use chrono::Timelike;
    Some(time.hour() * 60 + time.minute())
}

/// Parses a `YYYY-MM-DD` date, rejecting non-canonical renderings.
pub fn parse_day(text: &str) -> Option<NaiveDate> {
    let day = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    if day.to_string() != text {
        return None;
    }
    Some(day)
}
