use actix_web::{web, HttpResponse, Scope};

use attila_definitions::{Metadata, Region, RegionStub};
use attila_state::{RegionState, State};

use crate::nomad::api;

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct RegionCreateReq {
    region: Region,
}

#[derive(Serialize)]
pub struct RegionCreateResp {
    region: Region,
}

#[derive(Serialize)]
pub struct RegionGetResp {
    region: Region,
}

#[derive(Serialize)]
pub struct RegionListResp {
    regions: Vec<RegionStub>,
}

pub fn routes() -> Scope {
    web::scope("/regions")
        .route("", web::get().to(list))
        .route("", web::post().to(create))
        .route("/{region_name}", web::get().to(get))
        .route("/{region_name}", web::delete().to(delete))
}

async fn create(
    data: web::Data<AppState>,
    body: web::Json<RegionCreateReq>,
) -> Result<HttpResponse, ApiError> {
    let mut region = body.into_inner().region;

    region.set_defaults();
    region.validate()?;

    // Build the client up front so a bad region spec never enters the store.
    let client = api::Client::new(&region)
        .map_err(|e| ApiError::bad_request(&crate::error_chain_text(&e)))?;

    region.metadata = Some(Metadata::new());

    let stored = data.state.regions().create(region)?;
    data.controller.region_set(&stored.name, client);

    Ok(HttpResponse::Created().json(RegionCreateResp { region: stored }))
}

async fn delete(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let region_name = path.into_inner();

    data.state.regions().delete(&region_name)?;
    data.controller.region_delete(&region_name);

    Ok(HttpResponse::NoContent().finish())
}

async fn get(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let region = data.state.regions().get(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(RegionGetResp { region }))
}

async fn list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let regions = data.state.regions().list()?;
    Ok(HttpResponse::Ok().json(RegionListResp {
        regions: regions.iter().map(Region::stub).collect(),
    }))
}
