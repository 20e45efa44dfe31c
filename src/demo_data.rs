//! Demo spec generators for the rostering service.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Value};

/// Built-in demo specs, addressable by name through the demo-data routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    Small,
    Large,
}

impl DemoData {
    const ALL: [DemoData; 2] = [DemoData::Small, DemoData::Large];

    pub fn as_str(self) -> &'static str {
        match self {
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }

    fn parameters(self) -> DemoParameters {
        match self {
            DemoData::Small => DemoParameters {
                sites: vec!["Ambulatory care", "Critical care"],
                employee_count: 15,
                days_in_schedule: 14,
                day_off_requests: 3,
                seed: 37,
            },
            DemoData::Large => DemoParameters {
                sites: vec!["Ambulatory care", "Critical care", "Pediatric care"],
                employee_count: 40,
                days_in_schedule: 28,
                day_off_requests: 8,
                seed: 41,
            },
        }
    }
}

struct DemoParameters {
    sites: Vec<&'static str>,
    employee_count: usize,
    days_in_schedule: usize,
    day_off_requests: usize,
    seed: u64,
}

/// Name resolution is driven off [`DemoData::as_str`], so the route list
/// and the parser cannot drift apart.
impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DemoData::ALL
            .into_iter()
            .find(|demo| demo.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

pub fn list_demo_data() -> Vec<&'static str> {
    DemoData::ALL.iter().map(|demo| demo.as_str()).collect()
}

const FIRST_NAMES: &[&str] = &[
    "Amy", "Beth", "Carl", "Dan", "Elsa", "Flo", "Gus", "Hugo", "Ivy", "Jay", "Kim", "Lea",
    "Max", "Noa", "Otto", "Pia", "Quinn", "Rosa", "Sam", "Tara",
];
const LAST_NAMES: &[&str] = &[
    "Cole", "Fox", "Green", "Jones", "King", "Li", "Poe", "Rye", "Smith", "Watt",
];

/// Generates a complete demo spec document, deterministic per data set.
pub fn generate(demo: DemoData) -> Value {
    let parameters = demo.parameters();
    let mut rng = StdRng::seed_from_u64(parameters.seed);

    let start = NaiveDate::from_ymd_opt(2026, 3, 2).expect("fixed demo start date");
    let days: Vec<String> = (0..parameters.days_in_schedule)
        .map(|d| (start + chrono::Days::new(d as u64)).to_string())
        .collect();

    let mut names: Vec<String> = FIRST_NAMES
        .iter()
        .flat_map(|first| LAST_NAMES.iter().map(move |last| format!("{first} {last}")))
        .collect();
    names.shuffle(&mut rng);
    names.truncate(parameters.employee_count);

    let mut employees = Map::new();
    for name in &names {
        let skill = if rng.gen_bool(0.6) { "Nurse" } else { "Doctor" };
        let mut skills = vec![skill];
        if rng.gen_bool(0.3) {
            skills.push("Anaesthetics");
        }
        let site_home = if rng.gen_bool(0.8) {
            Some(*parameters.sites.choose(&mut rng).expect("site"))
        } else {
            None
        };
        let contract = if rng.gen_bool(0.85) { "full_time" } else { "part_time" };
        let mut def = json!({
            "skills": skills,
            "roles": ["caregiver"],
            "contract": {"type": contract}
        });
        if let Some(site) = site_home {
            def["site_home"] = json!(site);
        }
        let _ = employees.insert(name.clone(), def);
    }

    let mut demand = Vec::new();
    for day in &days {
        for (i, site) in parameters.sites.iter().enumerate() {
            let mut early = json!({"day": day, "site": site, "shift": "E", "min": 1, "max": 3});
            if i == 0 {
                early["requirements"] = json!({"skills_min": [{"skill": "Nurse", "min": 1}]});
            }
            demand.push(early);
            demand.push(json!({"day": day, "site": site, "shift": "L", "eq": 1}));
            demand.push(json!({"day": day, "site": site, "shift": "N", "eq": 1}));
        }
    }

    let weekend_days: Vec<String> = days
        .iter()
        .filter(|day| {
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let mut requests = Vec::new();
    for _ in 0..parameters.day_off_requests {
        let employee = names.choose(&mut rng).expect("employee");
        let day = days.choose(&mut rng).expect("day");
        requests.push(json!({"employee": employee, "day": day}));
    }

    let constraints = json!([
        {
            "id": "one-label-per-day",
            "kind": "exactly_one_assignment_per_day",
            "scope": {"employees": "ALL"},
            "shifts": ["E", "L", "N", "OFF"]
        },
        {
            "id": "no-early-after-night",
            "kind": "forbid_shift_sequences",
            "scope": {"employees": "ALL"},
            "sequences": [{"prev_shift": "N", "next_shift": "E"}]
        },
        {
            "id": "night-cap",
            "kind": "max_shifts_in_window",
            "scope": {"employees": "ALL"},
            "window_days": 7,
            "shifts": ["N"],
            "max": 3,
            "mode": "rolling"
        },
        {
            "id": "rest-11h",
            "kind": "min_rest_minutes_between_shifts",
            "scope": {"employees": "ALL"},
            "minutes": 660
        },
        {
            "id": "weekly-minutes",
            "kind": "max_work_minutes_in_window",
            "scope": {"employees": "ALL"},
            "window_days": 7,
            "max": 2880
        },
        {
            "id": "work-run-cap",
            "kind": "max_consecutive_work_days",
            "scope": {"employees": "ALL"},
            "max": 5
        },
        {
            "id": "real-weekends",
            "kind": "min_consecutive_days_off",
            "scope": {"employees": "ALL"},
            "min": 2
        },
        {
            "id": "weekend-work",
            "kind": "penalize_work_on_days",
            "scope": {"employees": "ALL"},
            "days": weekend_days,
            "penalty": {"weight": 2}
        },
        {
            "id": "night-work",
            "kind": "penalize_work_on_shifts",
            "scope": {"employees": "ALL"},
            "shifts": ["N"],
            "penalty": {"weight": 1}
        },
        {
            "id": "day-off-requests",
            "kind": "penalize_unmet_day_off_requests",
            "requests": requests,
            "penalty": {"weight": 4}
        },
        {
            "id": "fair-nights",
            "kind": "fair_distribution",
            "scope": {"employees": "ALL"},
            "measure": "count",
            "shifts": ["N"],
            "window_days": parameters.days_in_schedule,
            "target": "auto_mean",
            "penalize": "absolute_deviation",
            "penalty": {"weight": 2}
        }
    ]);

    json!({
        "sets": {
            "employees": names,
            "days": days,
            "shifts": ["E", "L", "N", "OFF"],
            "sites": parameters.sites
        },
        "shifts": {
            "E": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
            "L": {"start": "14:00", "end": "22:00", "minutes": 480, "is_work": true},
            "N": {"start": "22:00", "end": "06:00", "minutes": 480, "is_work": true},
            "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
        },
        "employees": employees,
        "demand": demand,
        "constraints": constraints,
        "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
    })
}
