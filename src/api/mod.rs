//! REST API and metrics listeners
//!
//! ## Endpoints
//!
//! - `GET /health` - Liveness
//! - `GET /api/v1/gpus` - Devices with registration state
//! - `GET /api/v1/gpus/:id` - Telemetry, ledger record and latest results
//! - `POST /api/v1/register` - Enroll a device
//! - `DELETE /api/v1/unregister/:id` - Remove a device from the ledger
//! - `GET /api/v1/pools/:pool`, `GET /api/v1/tags/:tag` - Ledger queries
//! - `GET|POST /api/v1/healthchecks` - Check configuration
//! - `GET /api/v1/healthchecks/:name` - One check
//! - `POST /api/v1/healthchecks/:name/run/:gpu_id` - Explicit run
//! - `GET /api/v1/results`, `GET /api/v1/results/:check/:gpu_id` - Stored results
//!
//! The Prometheus endpoint runs on its own listener, see [`spawn_metrics_server`].

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::metrics::PrometheusSink;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            enable_cors: true,
        }
    }
}

/// A running listener
pub struct ServerHandle {
    /// Address actually bound (useful with port 0)
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("server task failed: {e}");
        }
    }
}

/// Build the API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/gpus", get(routes::gpus::list_gpus))
        .route("/api/v1/gpus/:id", get(routes::gpus::get_gpu))
        .route("/api/v1/register", post(routes::registration::register))
        .route(
            "/api/v1/unregister/:id",
            delete(routes::registration::unregister),
        )
        .route("/api/v1/pools/:pool", get(routes::registration::list_pool))
        .route("/api/v1/tags/:tag", get(routes::registration::list_tag))
        .route(
            "/api/v1/healthchecks",
            get(routes::checks::list_checks).post(routes::checks::register_check),
        )
        .route("/api/v1/healthchecks/:name", get(routes::checks::get_check))
        .route(
            "/api/v1/healthchecks/:name/run/:gpu_id",
            post(routes::checks::run_check),
        )
        .route("/api/v1/results", get(routes::results::list_results))
        .route(
            "/api/v1/results/:check/:gpu_id",
            get(routes::results::get_result),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics::track_requests,
        ))
        .with_state(state)
}

async fn serve(
    name: &'static str,
    bind_addr: SocketAddr,
    app: Router,
) -> anyhow::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("{name} listening on {addr}");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown = async {
            let _ = shutdown_rx.await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("{name} error: {e}");
        }
        info!("{name} stopped");
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx,
        task,
    })
}

/// Spawn the API server in a background task
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<ServerHandle> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    serve("API server", config.bind_addr, app).await
}

/// Spawn the Prometheus text endpoint on its own listener
pub async fn spawn_metrics_server(
    bind_addr: SocketAddr,
    path: &str,
    sink: Arc<PrometheusSink>,
) -> anyhow::Result<ServerHandle> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let app = Router::new()
        .route(&path, get(routes::metrics::scrape))
        .with_state(sink);

    serve("metrics server", bind_addr, app).await
}
