use actix_web::{web, HttpResponse, Scope};

use attila_definitions::{JobRegisterRule, JobRegisterRuleStub, Metadata};
use attila_state::{RuleState, State};

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct RuleCreateReq {
    rule: JobRegisterRule,
}

#[derive(Serialize)]
pub struct RuleCreateResp {
    rule: JobRegisterRule,
}

#[derive(Serialize)]
pub struct RuleGetResp {
    rule: JobRegisterRule,
}

#[derive(Serialize)]
pub struct RuleListResp {
    rules: Vec<JobRegisterRuleStub>,
}

pub fn routes() -> Scope {
    web::scope("/rules")
        .route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/{rule_name}", web::get().to(get))
        .route("/{rule_name}", web::delete().to(delete))
}

async fn create(
    data: web::Data<AppState>,
    body: web::Json<RuleCreateReq>,
) -> Result<HttpResponse, ApiError> {
    let mut rule = body.into_inner().rule;

    rule.validate()?;
    rule.metadata = Some(Metadata::new());

    let stored = data.state.rules().create(rule)?;
    Ok(HttpResponse::Created().json(RuleCreateResp { rule: stored }))
}

async fn delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    data.state.rules().delete(&path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

async fn get(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let rule = data.state.rules().get(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(RuleGetResp { rule }))
}

async fn list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rules = data.state.rules().list()?;
    Ok(HttpResponse::Ok().json(RuleListResp {
        rules: rules.iter().map(JobRegisterRule::stub).collect(),
    }))
}
