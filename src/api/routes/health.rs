//! Liveness endpoint

use crate::api::types::HealthResponse;
use axum::Json;

/// GET /health
///
/// Always 200 while the process is serving
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
