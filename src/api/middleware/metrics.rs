//! Request counting and latency middleware

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::state::ApiState;

/// Report every routed request to the metrics sink
///
/// Installed with `route_layer`, so the route template (not the raw path) is
/// used as the `endpoint` label.
pub async fn track_requests(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    state.engine.metrics().observe_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        started.elapsed(),
    );

    response
}
