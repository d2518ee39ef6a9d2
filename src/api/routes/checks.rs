//! Check configuration and explicit runs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, trace, warn};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ChecksResponse,
};
use crate::health::{CheckConfig, CheckResult};
use crate::ledger::LedgerError;

/// GET /api/v1/healthchecks
pub async fn list_checks(State(state): State<ApiState>) -> Json<ChecksResponse> {
    Json(state.engine.registry().list().into())
}

/// GET /api/v1/healthchecks/:name
pub async fn get_check(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CheckConfig>> {
    Ok(Json(state.engine.registry().get(&name)?))
}

fn validate(config: &CheckConfig) -> ApiResult<()> {
    if config.name.trim().is_empty() {
        return Err(ApiError::InvalidRequest("check name must not be empty".into()));
    }
    if !config.warning_threshold.is_finite() || !config.critical_threshold.is_finite() {
        return Err(ApiError::InvalidRequest("thresholds must be finite".into()));
    }
    if config.warning_threshold > config.critical_threshold {
        return Err(ApiError::InvalidRequest(format!(
            "warning threshold {} exceeds critical threshold {}",
            config.warning_threshold, config.critical_threshold
        )));
    }
    if config.interval_secs == 0 {
        return Err(ApiError::InvalidRequest("interval_secs must be positive".into()));
    }
    Ok(())
}

/// POST /api/v1/healthchecks
///
/// Registers a new check or replaces one with the same name
pub async fn register_check(
    State(state): State<ApiState>,
    Json(config): Json<CheckConfig>,
) -> ApiResult<(StatusCode, Json<CheckConfig>)> {
    validate(&config)?;

    if state.engine.registry().register(config.clone()).is_some() {
        info!("replaced check {}", config.name);
    } else {
        info!("added check {}", config.name);
    }

    Ok((StatusCode::CREATED, Json(config)))
}

/// POST /api/v1/healthchecks/:name/run/:gpu_id
pub async fn run_check(
    State(state): State<ApiState>,
    Path((name, gpu_id)): Path<(String, u32)>,
) -> ApiResult<Json<CheckResult>> {
    let result = state.engine.run_check(&name, gpu_id).await?;

    match state.ledger.touch_health_check(gpu_id) {
        Ok(_) => {}
        // devices outside the ledger can still be checked
        Err(LedgerError::NotFound(_)) => trace!("GPU {gpu_id} not in ledger"),
        Err(e) => warn!("failed to record health check time for GPU {gpu_id}: {e}"),
    }

    Ok(Json(result))
}
