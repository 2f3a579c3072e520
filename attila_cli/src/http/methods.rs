use actix_web::{web, HttpResponse, Scope};

use attila_definitions::{JobRegisterMethod, JobRegisterMethodStub, Metadata};
use attila_state::{MethodState, State};

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct MethodCreateReq {
    method: JobRegisterMethod,
}

#[derive(Serialize)]
pub struct MethodCreateResp {
    method: JobRegisterMethod,
}

#[derive(Serialize)]
pub struct MethodGetResp {
    method: JobRegisterMethod,
}

#[derive(Serialize)]
pub struct MethodListResp {
    methods: Vec<JobRegisterMethodStub>,
}

pub fn routes() -> Scope {
    web::scope("/methods")
        .route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/{method_name}", web::get().to(get))
        .route("/{method_name}", web::delete().to(delete))
}

async fn create(
    data: web::Data<AppState>,
    body: web::Json<MethodCreateReq>,
) -> Result<HttpResponse, ApiError> {
    let mut method = body.into_inner().method;

    method.validate()?;
    method.metadata = Some(Metadata::new());

    let stored = data.state.methods().create(method)?;
    Ok(HttpResponse::Created().json(MethodCreateResp { method: stored }))
}

async fn delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    data.state.methods().delete(&path.into_inner())?;
    Ok(HttpResponse::NoContent().finish())
}

async fn get(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let method = data.state.methods().get(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(MethodGetResp { method }))
}

async fn list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let methods = data.state.methods().list()?;
    Ok(HttpResponse::Ok().json(MethodListResp {
        methods: methods.iter().map(JobRegisterMethod::stub).collect(),
    }))
}
