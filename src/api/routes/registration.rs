//! Ledger endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, warn};

use crate::api::{error::ApiResult, state::ApiState, types::DevicesResponse};
use crate::device::DeviceError;
use crate::ledger::{DeviceRecord, Registration};

const REGISTERED_BY: &str = "api";

/// POST /api/v1/register
///
/// Missing name/uuid are filled from the device source when it knows the GPU.
/// Devices the source has never seen can still be enrolled ahead of time.
pub async fn register(
    State(state): State<ApiState>,
    Json(mut request): Json<Registration>,
) -> ApiResult<(StatusCode, Json<DeviceRecord>)> {
    let gpu_id = request.gpu_id;

    let known = match state.engine.snapshot(gpu_id).await {
        Ok(device) => {
            if request.name.is_empty() {
                request.name = device.name;
            }
            if request.uuid.is_empty() {
                request.uuid = device.uuid;
            }
            true
        }
        Err(DeviceError::NotFound(_)) => {
            debug!("GPU {gpu_id} unknown to the device source, enrolling anyway");
            false
        }
        Err(e) => {
            warn!("GPU {gpu_id}: could not read device: {e}");
            false
        }
    };

    let record = state.ledger.register(request, REGISTERED_BY)?;

    if known && let Err(e) = state.engine.source().set_registered(gpu_id, true).await {
        warn!("GPU {gpu_id}: failed to set registered flag: {e}");
    }
    state.engine.metrics().observe_registration(&record, true);
    state.persist_ledger().await;

    Ok((StatusCode::CREATED, Json(record)))
}

/// DELETE /api/v1/unregister/:id
pub async fn unregister(
    State(state): State<ApiState>,
    Path(gpu_id): Path<u32>,
) -> ApiResult<Json<DeviceRecord>> {
    let record = state.ledger.unregister(gpu_id)?;

    match state.engine.source().set_registered(gpu_id, false).await {
        Ok(()) | Err(DeviceError::NotFound(_)) => {}
        Err(e) => warn!("GPU {gpu_id}: failed to clear registered flag: {e}"),
    }
    state.engine.metrics().observe_registration(&record, false);
    state.engine.forget_device(gpu_id);
    state.persist_ledger().await;

    Ok(Json(record))
}

/// GET /api/v1/pools/:pool
pub async fn list_pool(
    State(state): State<ApiState>,
    Path(pool): Path<String>,
) -> Json<DevicesResponse> {
    Json(state.ledger.find_by_pool(&pool).into())
}

/// GET /api/v1/tags/:tag
pub async fn list_tag(
    State(state): State<ApiState>,
    Path(tag): Path<String>,
) -> Json<DevicesResponse> {
    Json(state.ledger.find_by_tag(&tag).into())
}
