use actix_web::{post, web, HttpResponse};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    configuration::PersistenceSettings,
    domain::{CityList, DiscoveryMode},
    services::{BatchOrchestrator, BatchRequest},
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    request_id: String,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    example: Option<Value>,
}

#[post("/upfitters")]
pub async fn find_upfitters(
    orchestrator: web::Data<BatchOrchestrator>,
    persistence: web::Data<PersistenceSettings>,
    body: web::Json<Value>,
) -> HttpResponse {
    run_batch(&orchestrator, &persistence, &body, DiscoveryMode::Search).await
}

#[post("/generateInfoForCities")]
pub async fn generate_info_for_cities(
    orchestrator: web::Data<BatchOrchestrator>,
    persistence: web::Data<PersistenceSettings>,
    body: web::Json<Value>,
) -> HttpResponse {
    run_batch(&orchestrator, &persistence, &body, DiscoveryMode::ModelOnly).await
}

async fn run_batch(
    orchestrator: &BatchOrchestrator,
    persistence: &PersistenceSettings,
    body: &Value,
    mode: DiscoveryMode,
) -> HttpResponse {
    let request_id: String = Uuid::new_v4().to_string().chars().take(8).collect();

    let cities = match CityList::parse(body) {
        Ok(cities) => cities.into_inner(),
        Err(e) => {
            log::warn!("[{}] Rejected request: {}", request_id, e);
            return HttpResponse::BadRequest().json(ErrorBody {
                request_id,
                error: "Invalid input",
                message: e.to_string(),
                example: Some(json!({ "cities": ["Springfield, IL", "Andalusia, AL"] })),
            });
        }
    };

    log::info!(
        "[{}] Processing {} cities ({:?}): {:?}",
        request_id,
        cities.len(),
        mode,
        cities
    );

    let request = BatchRequest {
        request_id: request_id.clone(),
        cities,
        mode,
        destination: persistence.destination.clone(),
    };

    match orchestrator.run(request).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(failure) => {
            log::error!(
                "[{}] {} ({} records kept in memory)",
                request_id,
                failure,
                failure.partial.len()
            );
            let body = ErrorBody {
                request_id,
                error: "Processing failed",
                message: failure.error.to_string(),
                example: None,
            };
            match failure.error.is_client_error() {
                true => HttpResponse::BadRequest().json(body),
                false => HttpResponse::InternalServerError().json(body),
            }
        }
    }
}
