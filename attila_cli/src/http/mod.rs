use std::fmt;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

use attila_state::{State, StateError};

use crate::nomad::Controller;

mod regions;
mod methods;
mod rules;
mod plans;
mod topologies;

/// Shared handler state: the configured store plus the controller facade.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<dyn State>,
    pub controller: Arc<Controller>,
}

/// The single user-visible failure shape: a status code plus a message,
/// rendered as `{"error": {"message", "code"}}`.
#[derive(Debug)]
pub struct ApiError {
    message: String,
    code: StatusCode,
}

impl ApiError {
    pub fn new(code: u16, message: &str) -> ApiError {
        ApiError {
            message: message.to_string(),
            code: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn bad_request(message: &str) -> ApiError {
        ApiError::new(400, message)
    }

    pub fn not_found(message: &str) -> ApiError {
        ApiError::new(404, message)
    }

    pub fn internal(message: &str) -> ApiError {
        ApiError::new(500, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.code).json(json!({
            "error": {
                "message": self.message,
                "code": self.code.as_u16(),
            }
        }))
    }
}

impl From<StateError> for ApiError {
    fn from(e: StateError) -> ApiError {
        ApiError::new(e.code, &e.message)
    }
}

/// Store errors keep their own code; anything else is an internal failure
/// carrying the full cause chain.
impl From<crate::Error> for ApiError {
    fn from(e: crate::Error) -> ApiError {
        if let crate::ErrorKind::State(se) = e.kind() {
            return ApiError::new(se.code, &se.message);
        }
        ApiError::internal(&crate::error_chain_text(&e))
    }
}

impl From<attila_definitions::Error> for ApiError {
    fn from(e: attila_definitions::Error) -> ApiError {
        let text = e
            .iter()
            .map(|cause| cause.to_string())
            .collect::<Vec<_>>()
            .join(": ");
        ApiError::bad_request(&text)
    }
}

/// Malformed request bodies become the canonical 400 document instead of
/// actix's default error page.
pub fn json_error_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::bad_request(&format!("failed to decode object: {}", err)).into()
    })
}

/// Mount the versioned API surface.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1alpha1")
            .service(regions::routes())
            .service(
                web::scope("/jobs/register")
                    .service(methods::routes())
                    .service(rules::routes())
                    .service(plans::routes()),
            )
            .service(topologies::routes()),
    );
}
