//! Device endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{GpuDetail, GpuSummary, GpusResponse},
};

/// GET /api/v1/gpus
pub async fn list_gpus(State(state): State<ApiState>) -> ApiResult<Json<GpusResponse>> {
    let devices = state.engine.list_devices().await?;

    let gpus: Vec<GpuSummary> = devices
        .into_iter()
        .map(|device| GpuSummary {
            pool: state.ledger.get(device.id).ok().map(|record| record.pool),
            id: device.id,
            name: device.name,
            uuid: device.uuid,
            online: device.online,
            registered: device.registered,
        })
        .collect();

    Ok(Json(GpusResponse {
        count: gpus.len(),
        gpus,
    }))
}

/// GET /api/v1/gpus/:id
pub async fn get_gpu(
    State(state): State<ApiState>,
    Path(gpu_id): Path<u32>,
) -> ApiResult<Json<GpuDetail>> {
    let device = state.engine.snapshot(gpu_id).await?;

    Ok(Json(GpuDetail {
        registration: state.ledger.get(gpu_id).ok(),
        results: state.engine.store().for_device(gpu_id),
        device,
    }))
}
