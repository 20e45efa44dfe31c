//! REST API handlers for the rostering service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::demo_data::{self, DemoData};
use crate::error::RosterError;
use crate::normalize;
use crate::schedule::FlatAssignment;
use crate::schema;
use crate::solver::{self, RosterOutcome, SolveOptions};

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// Job tracking for active solves.
struct SolveJob {
    status: JobStatus,
    outcome: Option<RosterOutcome>,
    error: Option<String>,
}

/// Application state shared across handlers. The job registry is the only
/// resource shared between solves.
pub struct AppState {
    jobs: RwLock<HashMap<String, SolveJob>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub spec: Value,
    pub max_time_seconds: u64,
    pub workers: usize,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorsResponse {
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub spec: Value,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleDto {
    pub data: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>,
    pub rest: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat: Option<Vec<FlatAssignment>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalties: Option<BTreeMap<String, i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<i64>,
}

impl ResultResponse {
    fn from_outcome(outcome: &RosterOutcome) -> Self {
        match &outcome.roster {
            Some(roster) if outcome.status.has_assignment() => Self {
                status: outcome.status.as_str(),
                objective_value: outcome.objective_value,
                schedule: Some(ScheduleDto {
                    data: roster.data.clone(),
                    rest: roster.rest.clone(),
                }),
                flat: Some(roster.flat.clone()),
                penalties: Some(outcome.penalties.clone()),
                message: None,
                bound: None,
            },
            _ => Self {
                status: outcome.status.as_str(),
                objective_value: None,
                schedule: None,
                flat: None,
                penalties: None,
                message: outcome.message.clone(),
                bound: outcome.bound,
            },
        }
    }

    fn failed(message: Option<String>) -> Self {
        Self {
            status: "ERROR",
            objective_value: None,
            schedule: None,
            flat: None,
            penalties: None,
            message,
            bound: None,
        }
    }
}

// ============================================================================
// Router and Handlers
// ============================================================================

/// Creates the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health & Info
        .route("/health", get(health))
        .route("/info", get(info_endpoint))
        // Demo data
        .route("/demo-data", get(list_demo_data))
        .route("/demo-data/{id}", get(get_demo_data))
        // Roster jobs
        .route("/roster-jobs", post(submit_job))
        .route("/roster-jobs/{id}/status", get(job_status))
        .route("/roster-jobs/{id}/result", get(job_result))
        .route("/validate", post(validate_spec))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health - Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "UP" })
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub solver_engine: &'static str,
}

/// GET /info - Application info endpoint.
async fn info_endpoint() -> Json<InfoResponse> {
    Json(InfoResponse {
        name: "Shift Rostering",
        version: env!("CARGO_PKG_VERSION"),
        solver_engine: "selen",
    })
}

/// GET /demo-data - List available demo data sets.
async fn list_demo_data() -> Json<Vec<&'static str>> {
    Json(demo_data::list_demo_data())
}

/// GET /demo-data/{id} - Get a specific demo spec.
async fn get_demo_data(Path(id): Path<String>) -> Result<Json<Value>, StatusCode> {
    match id.parse::<DemoData>() {
        Ok(demo) => Ok(Json(demo_data::generate(demo))),
        Err(_) => Err(StatusCode::NOT_FOUND),
    }
}

/// POST /roster-jobs - Validate a spec and start solving it.
///
/// Validation runs synchronously; a broken spec is rejected with 422 and
/// never allocates a job. The solve itself runs in the background.
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorsResponse>)> {
    let mut errors = Vec::new();
    if request.max_time_seconds < 1 {
        errors.push("max_time_seconds must be at least 1".to_string());
    }
    if request.workers < 1 {
        errors.push("workers must be at least 1".to_string());
    }
    if !errors.is_empty() {
        return Err(unprocessable(errors));
    }
    if let Err(error) = check_spec(&request.spec) {
        return Err(unprocessable(error.messages()));
    }

    let id = Uuid::new_v4().to_string();
    {
        let mut jobs = state.jobs.write();
        let _ = jobs.insert(
            id.clone(),
            SolveJob {
                status: JobStatus::Queued,
                outcome: None,
                error: None,
            },
        );
    }
    info!(job_id = %id, "roster job accepted");

    let job_id = id.clone();
    let state_clone = state.clone();
    let options = SolveOptions {
        max_time_seconds: request.max_time_seconds,
        workers: request.workers,
    };
    let spec = request.spec;
    rayon::spawn(move || {
        run_job(&state_clone, &job_id, &spec, &options);
    });

    Ok(Json(SubmitResponse { job_id: id }))
}

/// POST /validate - Validate a spec without allocating a job.
async fn validate_spec(Json(request): Json<ValidateRequest>) -> Json<ValidateResponse> {
    match check_spec(&request.spec) {
        Ok(()) => Json(ValidateResponse {
            valid: true,
            errors: Vec::new(),
        }),
        Err(error) => Json(ValidateResponse {
            valid: false,
            errors: error.messages(),
        }),
    }
}

/// GET /roster-jobs/{id}/status - Job lifecycle state.
async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, StatusCode> {
    match state.jobs.read().get(&id) {
        Some(job) => Ok(Json(StatusResponse {
            job_id: id,
            status: job.status,
            bound: job.outcome.as_ref().and_then(|o| o.bound),
        })),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /roster-jobs/{id}/result - The projected result document.
async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse>, StatusCode> {
    let jobs = state.jobs.read();
    let Some(job) = jobs.get(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    match job.status {
        JobStatus::Done => job
            .outcome
            .as_ref()
            .map(ResultResponse::from_outcome)
            .map(Json)
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR),
        JobStatus::Failed => Ok(Json(ResultResponse::failed(job.error.clone()))),
        JobStatus::Queued | JobStatus::Running => Err(StatusCode::CONFLICT),
    }
}

// ============================================================================
// Orchestration
// ============================================================================

/// Synchronous validation: schema pass, then reference pass.
fn check_spec(doc: &Value) -> Result<(), RosterError> {
    let report = schema::validate(doc);
    if !report.valid {
        return Err(RosterError::Schema(report.errors));
    }
    normalize::normalize(doc).map(|_| ())
}

/// Drives one job through the pipeline and writes the terminal state into
/// the registry.
fn run_job(state: &AppState, job_id: &str, doc: &Value, options: &SolveOptions) {
    set_status(state, job_id, JobStatus::Running);
    match solver::solve_document(doc, options) {
        Ok(outcome) => {
            info!(job_id, status = outcome.status.as_str(), "roster job finished");
            let mut jobs = state.jobs.write();
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Done;
                job.outcome = Some(outcome);
            }
        }
        Err(failure) => {
            error!(job_id, %failure, "roster job failed");
            let mut jobs = state.jobs.write();
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Failed;
                job.error = Some(failure.to_string());
            }
        }
    }
}

fn set_status(state: &AppState, job_id: &str, status: JobStatus) {
    let mut jobs = state.jobs.write();
    if let Some(job) = jobs.get_mut(job_id) {
        job.status = status;
    }
}

fn unprocessable(errors: Vec<String>) -> (StatusCode, Json<ErrorsResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorsResponse { errors }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveStatus;
    use serde_json::json;

    fn tiny_doc() -> Value {
        json!({
            "sets": {
                "employees": ["P1"],
                "days": ["2026-03-02"],
                "shifts": ["M", "OFF"],
                "sites": ["A"]
            },
            "shifts": {
                "M": {"start": "06:00", "end": "14:00", "minutes": 480, "is_work": true},
                "OFF": {"start": "00:00", "end": "00:00", "minutes": 0, "is_work": false}
            },
            "employees": {"P1": {"skills": [], "roles": [], "site_home": "A",
                                  "contract": {"type": "full_time"}}},
            "demand": [{"day": "2026-03-02", "site": "A", "shift": "M", "eq": 1}],
            "constraints": [
                {"kind": "exactly_one_assignment_per_day",
                 "scope": {"employees": "ALL"},
                 "shifts": ["M", "OFF"]}
            ],
            "objective": {"mode": "minimize", "terms": [{"kind": "soft_penalties_total", "weight": 1}]}
        })
    }

    fn seeded_state(job_id: &str) -> AppState {
        let state = AppState::new();
        let _ = state.jobs.write().insert(
            job_id.to_string(),
            SolveJob {
                status: JobStatus::Queued,
                outcome: None,
                error: None,
            },
        );
        state
    }

    #[test]
    fn check_spec_accepts_a_valid_document() {
        assert!(check_spec(&tiny_doc()).is_ok());
    }

    #[test]
    fn check_spec_reports_schema_errors_first() {
        let doc = json!({"sets": {}});
        match check_spec(&doc) {
            Err(RosterError::Schema(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn check_spec_reports_reference_errors() {
        let mut doc = tiny_doc();
        doc["employees"]["P1"]["site_home"] = json!("NOWHERE");
        match check_spec(&doc) {
            Err(RosterError::Reference(errors)) => {
                assert!(errors.iter().any(|e| e.contains("unknown site `NOWHERE`")));
            }
            other => panic!("expected reference error, got {other:?}"),
        }
    }

    #[test]
    fn run_job_records_the_outcome() {
        let state = seeded_state("job-1");
        run_job(&state, "job-1", &tiny_doc(), &SolveOptions::default());
        let jobs = state.jobs.read();
        let job = jobs.get("job-1").expect("job");
        assert_eq!(job.status, JobStatus::Done);
        let outcome = job.outcome.as_ref().expect("outcome");
        assert_eq!(outcome.status, SolveStatus::Optimal);
    }

    #[test]
    fn infeasible_jobs_finish_done_with_a_message() {
        let mut doc = tiny_doc();
        doc["demand"][0]["eq"] = json!(2);
        let state = seeded_state("job-2");
        run_job(&state, "job-2", &doc, &SolveOptions::default());
        let jobs = state.jobs.read();
        let job = jobs.get("job-2").expect("job");
        assert_eq!(job.status, JobStatus::Done);
        let outcome = job.outcome.as_ref().expect("outcome");
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        let response = ResultResponse::from_outcome(outcome);
        assert_eq!(response.status, "INFEASIBLE");
        assert!(response.schedule.is_none());
        assert!(response.message.is_some());
    }

    #[test]
    fn done_results_carry_both_views_and_penalties() {
        let state = seeded_state("job-3");
        run_job(&state, "job-3", &tiny_doc(), &SolveOptions::default());
        let jobs = state.jobs.read();
        let outcome = jobs.get("job-3").and_then(|j| j.outcome.as_ref()).expect("outcome");
        let response = ResultResponse::from_outcome(outcome);
        assert_eq!(response.status, "OPTIMAL");
        assert_eq!(response.objective_value, Some(0));
        let schedule = response.schedule.expect("schedule");
        assert_eq!(schedule.data["2026-03-02"]["A"]["M"], vec!["P1".to_string()]);
        assert_eq!(response.flat.expect("flat").len(), 1);
    }
}
