use actix_web::{web, HttpResponse, Scope};

use attila_definitions::{Topology, TopologyOverview};

use super::{ApiError, AppState};

#[derive(Serialize)]
pub struct TopologyGetResp {
    topology: Topology,
}

#[derive(Serialize)]
pub struct TopologyListResp {
    topologies: Vec<TopologyOverview>,
}

pub fn routes() -> Scope {
    web::scope("/topologies")
        .route("", web::get().to(list))
        .route("/{region_name}", web::get().to(get))
}

async fn get(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let region_name = path.into_inner();

    match data.controller.topology_get(&region_name) {
        Some(topology) => Ok(HttpResponse::Ok().json(TopologyGetResp { topology })),
        None => Err(ApiError::not_found(&format!(
            "topology for region '{}' not found",
            region_name
        ))),
    }
}

async fn list(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(TopologyListResp {
        topologies: data.controller.topology_list(),
    }))
}
