use actix_web::{web, HttpResponse, Scope};
use ulid::Ulid;

use attila_definitions::{Job, JobRegisterPlan, JobRegisterPlanRun};
use attila_state::{PlanState, State};

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct PlanCreateReq {
    job: Job,
}

#[derive(Serialize)]
pub struct PlanCreateResp {
    plan: JobRegisterPlan,
}

#[derive(Serialize)]
pub struct PlanGetResp {
    plan: JobRegisterPlan,
}

#[derive(Serialize)]
pub struct PlanListResp {
    plans: Vec<JobRegisterPlan>,
}

#[derive(Deserialize)]
pub struct PlanRunReq {
    job: Job,
}

#[derive(Serialize)]
pub struct PlanRunResp {
    run: JobRegisterPlanRun,
    partial_failure_error: Option<String>,
}

pub fn routes() -> Scope {
    web::scope("/plans")
        .route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/{id}", web::get().to(get))
        .route("/{id}", web::delete().to(delete))
        .route("/{id}/run", web::post().to(run))
}

fn parse_plan_id(raw: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw)
        .map_err(|e| ApiError::bad_request(&format!("failed to parse plan ID '{}': {}", raw, e)))
}

async fn create(
    data: web::Data<AppState>,
    body: web::Json<PlanCreateReq>,
) -> Result<HttpResponse, ApiError> {
    let job = body.into_inner().job;

    let plan = data
        .controller
        .plan_create(&job, data.state.as_ref())
        .await
        .map_err(|e| ApiError::internal(&crate::error_chain_text(&e)))?;

    let stored = data
        .state
        .plans()
        .create(plan)
        .map_err(|e| ApiError::internal(&e.message))?;

    Ok(HttpResponse::Created().json(PlanCreateResp { plan: stored }))
}

async fn delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_plan_id(&path.into_inner())?;
    data.state.plans().delete(&id)?;
    Ok(HttpResponse::NoContent().finish())
}

async fn get(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_plan_id(&path.into_inner())?;
    let plan = data.state.plans().get(&id)?;
    Ok(HttpResponse::Ok().json(PlanGetResp { plan }))
}

async fn list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let plans = data.state.plans().list()?;
    Ok(HttpResponse::Ok().json(PlanListResp { plans }))
}

/// Execute a plan. The response is always the full aggregate; per-region
/// failures ride inside it with an optional top-level summary, so operators
/// see exactly which regions took the job.
async fn run(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PlanRunReq>,
) -> Result<HttpResponse, ApiError> {
    let id = parse_plan_id(&path.into_inner())?;
    let job = body.into_inner().job;

    let (run, partial_failure_error) = data
        .controller
        .plan_run(id, &job, data.state.as_ref())
        .await?;

    Ok(HttpResponse::Created().json(PlanRunResp {
        run,
        partial_failure_error,
    }))
}
