//! Integration tests for API endpoints
//!
//! Every test binds a real listener on an ephemeral port and talks to it
//! through [`GputlClient`] or plain reqwest.

use std::path::PathBuf;
use std::sync::Arc;

use assert_matches::assert_matches;
use gpu_ops::{
    CheckConfig, CheckType, DeviceLedger, DeviceSnapshot, HealthStatus, InMemoryDeviceSource,
    PrometheusSink,
    api::{
        ApiConfig, ApiState, ServerHandle, spawn_api_server, spawn_metrics_server,
        types::DevicesResponse,
    },
    client::{ClientError, GputlClient},
    ledger::Registration,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::json;
use tempfile::{TempDir, tempdir};

use crate::helpers::{TestEngine, engine_over, ledger_with, registration};

struct TestApi {
    server: ServerHandle,
    client: GputlClient,
    base_url: String,
    test: TestEngine,
    ledger: Arc<DeviceLedger>,
    ledger_file: PathBuf,
    _dir: TempDir,
}

/// GPU 0 enrolled, GPU 1 present but not enrolled
async fn spawn_test_api() -> TestApi {
    let spare = DeviceSnapshot {
        registered: false,
        ..DeviceSnapshot::idle(1, "gpu1", 24.0, 250.0)
    };
    let source = Arc::new(InMemoryDeviceSource::with_devices([
        DeviceSnapshot::idle(0, "gpu0", 24.0, 250.0),
        spare,
    ]));
    let test = engine_over(source);
    let ledger = ledger_with(&[0]);

    let dir = tempdir().unwrap();
    let ledger_file = dir.path().join("registry.json");
    let state = ApiState::new(test.engine.clone(), ledger.clone()).with_ledger_path(&ledger_file);

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
    };
    let server = spawn_api_server(config, state).await.unwrap();
    let base_url = format!("http://{}", server.addr);

    TestApi {
        client: GputlClient::new(&base_url).unwrap(),
        base_url,
        server,
        test,
        ledger,
        ledger_file,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = spawn_test_api().await;

    let health = api.client.health().await.unwrap();

    assert_eq!(health.status, "ok");
    assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_list_gpus_shows_enrollment() {
    let api = spawn_test_api().await;

    let response = api.client.list_gpus().await.unwrap();

    assert_eq!(response.count, 2);
    assert_eq!(response.gpus[0].pool.as_deref(), Some("default"));
    assert!(response.gpus[0].registered);
    assert_eq!(response.gpus[1].pool, None);
    assert!(!response.gpus[1].registered);
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_gpu_detail() {
    let api = spawn_test_api().await;
    api.test.engine.run_tick(1).await;

    let detail = api.client.get_gpu(0).await.unwrap();

    assert_eq!(detail.device.name, "gpu0");
    assert_eq!(detail.registration.unwrap().gpu_id, 0);
    assert_eq!(detail.results.len(), 3);

    assert_matches!(
        api.client.get_gpu(9).await,
        Err(ClientError::Api { status: 404, .. })
    );
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_register_fills_from_device_and_persists() {
    let api = spawn_test_api().await;

    let request = Registration {
        name: String::new(),
        ..registration(1, "inference", &["rack-2"])
    };
    let record = api.client.register(&request).await.unwrap();

    assert_eq!(record.gpu_id, 1);
    assert_eq!(record.name, "gpu1");
    assert_eq!(record.pool, "inference");
    assert_eq!(record.registered_by, "api");
    assert!(api.ledger.contains(1));
    assert!(api.test.engine.snapshot(1).await.unwrap().registered);
    assert!(api.test.sink.registrations.lock().contains(&(1, true)));

    let on_disk = DeviceLedger::load(&api.ledger_file).unwrap();
    assert!(on_disk.contains(1));

    assert_matches!(
        api.client.register(&request).await,
        Err(ClientError::Api { status: 409, message }) if message.contains("already registered")
    );
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_register_device_unknown_to_source() {
    let api = spawn_test_api().await;

    let record = api
        .client
        .register(&registration(42, "", &[]))
        .await
        .unwrap();

    assert_eq!(record.pool, "default");
    assert!(api.ledger.contains(42));
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_register_rejects_malformed_body() {
    let api = spawn_test_api().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/register", api.base_url))
        .json(&json!({"pool": "no-id"}))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_unregister() {
    let api = spawn_test_api().await;

    api.test.engine.run_tick(1).await;
    assert_eq!(api.test.engine.store().for_device(0).len(), 3);

    let record = api.client.unregister(0).await.unwrap();

    assert_eq!(record.gpu_id, 0);
    assert!(!api.ledger.contains(0));
    assert!(api.test.engine.store().for_device(0).is_empty());
    assert_eq!(api.test.sink.forgotten.lock().len(), 3);
    assert!(!api.test.engine.snapshot(0).await.unwrap().registered);
    assert!(!DeviceLedger::load(&api.ledger_file).unwrap().contains(0));

    assert_matches!(
        api.client.unregister(0).await,
        Err(ClientError::Api { status: 404, .. })
    );
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_pool_and_tag_queries() {
    let api = spawn_test_api().await;
    api.client
        .register(&registration(1, "training", &["a100"]))
        .await
        .unwrap();
    api.client
        .register(&registration(2, "training", &["h100"]))
        .await
        .unwrap();

    let http = reqwest::Client::new();
    let pool: DevicesResponse = http
        .get(format!("{}/api/v1/pools/training", api.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tag: DevicesResponse = http
        .get(format!("{}/api/v1/tags/a100", api.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(pool.count, 2);
    assert_eq!(tag.count, 1);
    assert_eq!(tag.devices[0].gpu_id, 1);
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_check_configuration() {
    let api = spawn_test_api().await;
    let http = reqwest::Client::new();

    assert_eq!(api.client.list_checks().await.unwrap().count, 3);

    let created = http
        .post(format!("{}/api/v1/healthchecks", api.base_url))
        .json(&CheckConfig::new("hot_memory", CheckType::Memory, 50.0, 70.0))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(api.client.list_checks().await.unwrap().count, 4);

    let inverted = http
        .post(format!("{}/api/v1/healthchecks", api.base_url))
        .json(&CheckConfig::new("inverted", CheckType::Power, 95.0, 80.0))
        .send()
        .await
        .unwrap();
    assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);

    let fetched = http
        .get(format!("{}/api/v1/healthchecks/hot_memory", api.base_url))
        .send()
        .await
        .unwrap()
        .json::<CheckConfig>()
        .await
        .unwrap();
    assert_eq!(fetched.warning_threshold, 50.0);

    let missing = http
        .get(format!("{}/api/v1/healthchecks/nope", api.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_run_check_and_results() {
    let api = spawn_test_api().await;
    api.test
        .source
        .update(0, |gpu| gpu.temperature_c = 88.0)
        .unwrap();

    let result = api.client.run_check("temperature_check", 0).await.unwrap();

    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert_eq!(result.value, 88.0);
    assert!(api.ledger.get(0).unwrap().last_health_check.is_some());

    let results = api.client.list_results().await.unwrap();
    assert_eq!(results.count, 1);
    assert_eq!(results.results[0], result);

    let stored = reqwest::get(format!(
        "{}/api/v1/results/temperature_check/0",
        api.base_url
    ))
    .await
    .unwrap();
    assert_eq!(stored.status(), StatusCode::OK);

    let never_run = reqwest::get(format!("{}/api/v1/results/power_check/0", api.base_url))
        .await
        .unwrap();
    assert_eq!(never_run.status(), StatusCode::NOT_FOUND);

    assert_matches!(
        api.client.run_check("nope", 0).await,
        Err(ClientError::Api { status: 404, .. })
    );
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_run_check_on_device_outside_ledger() {
    let api = spawn_test_api().await;

    let result = api.client.run_check("power_check", 1).await.unwrap();

    assert_eq!(result.gpu_id, 1);
    assert_eq!(result.status, HealthStatus::Healthy);
    assert!(!api.ledger.contains(1));
    assert!(api.ledger.get(0).unwrap().last_health_check.is_none());
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_run_disabled_check_conflicts() {
    let api = spawn_test_api().await;
    api.test
        .engine
        .registry()
        .register(CheckConfig::new("power_check", CheckType::Power, 80.0, 95.0).disabled());

    assert_matches!(
        api.client.run_check("power_check", 0).await,
        Err(ClientError::Api { status: 409, .. })
    );
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_run_check_on_missing_device() {
    let api = spawn_test_api().await;

    let result = api.client.run_check("memory_check", 9).await.unwrap();

    assert_eq!(result.status, HealthStatus::Unhealthy);
    assert!(result.message.starts_with("device error"));
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_requests_are_observed_by_route() {
    let api = spawn_test_api().await;

    let _ = api.client.get_gpu(0).await;
    let _ = api.client.get_gpu(9).await;

    let requests = api.test.sink.requests.lock().clone();
    assert!(requests.contains(&("GET".to_string(), "/api/v1/gpus/:id".to_string(), 200)));
    assert!(requests.contains(&("GET".to_string(), "/api/v1/gpus/:id".to_string(), 404)));
    api.server.shutdown().await;
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let sink = Arc::new(PrometheusSink::new().unwrap());
    let server = spawn_metrics_server("127.0.0.1:0".parse().unwrap(), "metrics", sink.clone())
        .await
        .unwrap();

    let snapshot = DeviceSnapshot {
        temperature_c: 61.0,
        ..DeviceSnapshot::idle(0, "gpu0", 24.0, 250.0)
    };
    gpu_ops::MetricsSink::observe_device(sink.as_ref(), &snapshot);

    let response = reqwest::get(format!("http://{}/metrics", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.unwrap();
    assert!(body.contains(r#"gpu_temperature_celsius{gpu_id="0",gpu_name="gpu0"} 61"#));

    server.shutdown().await;
}
