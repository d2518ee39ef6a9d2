//! Stored check results

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{error::ApiResult, state::ApiState, types::ResultsResponse};
use crate::health::CheckResult;

/// GET /api/v1/results
///
/// Sorted by check name, then GPU id
pub async fn list_results(State(state): State<ApiState>) -> Json<ResultsResponse> {
    let mut results: Vec<_> = state.engine.store().all().into_iter().collect();
    results.sort_by(|(a, _), (b, _)| a.cmp(b));

    Json(
        results
            .into_iter()
            .map(|(_, result)| result)
            .collect::<Vec<_>>()
            .into(),
    )
}

/// GET /api/v1/results/:check/:gpu_id
pub async fn get_result(
    State(state): State<ApiState>,
    Path((check_name, gpu_id)): Path<(String, u32)>,
) -> ApiResult<Json<CheckResult>> {
    Ok(Json(state.engine.store().latest(&check_name, gpu_id)?))
}
