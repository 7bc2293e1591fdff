//! HTTP handlers, grouped by resource. Each one is a thin adapter: extract, call the
//! owning service, wrap the result in JSON.

use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod auth;
pub mod posts;
pub mod tags;
pub mod users;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// health
///
/// [Public Route] Liveness probe for load balancers. Touches nothing else.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
