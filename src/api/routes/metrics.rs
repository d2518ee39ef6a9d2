//! Prometheus scrape endpoint

use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use prometheus::TEXT_FORMAT;
use tracing::error;

use crate::metrics::PrometheusSink;

/// GET <metrics.path>
pub async fn scrape(State(sink): State<Arc<PrometheusSink>>) -> Response {
    match sink.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
