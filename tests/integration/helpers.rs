//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gpu_ops::{
    CheckRegistry, CheckResult, DeviceLedger, DeviceRecord, DeviceSnapshot, HealthEngine,
    InMemoryDeviceSource, MetricsSink, ResultKey, ResultStore, ledger::Registration,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Sink that remembers what it was told
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub devices: Mutex<Vec<u32>>,
    pub checks: Mutex<Vec<CheckResult>>,
    pub registrations: Mutex<Vec<(u32, bool)>>,
    pub forgotten: Mutex<Vec<ResultKey>>,
    pub requests: Mutex<Vec<(String, String, u16)>>,
}

impl MetricsSink for RecordingSink {
    fn observe_device(&self, snapshot: &DeviceSnapshot) {
        self.devices.lock().push(snapshot.id);
    }

    fn observe_check(&self, result: &CheckResult, _latency: Duration) {
        self.checks.lock().push(result.clone());
    }

    fn observe_registration(&self, record: &DeviceRecord, registered: bool) {
        self.registrations.lock().push((record.gpu_id, registered));
    }

    fn forget_check(&self, key: &ResultKey) {
        self.forgotten.lock().push(key.clone());
    }

    fn observe_request(&self, method: &str, endpoint: &str, status: u16, _latency: Duration) {
        self.requests
            .lock()
            .push((method.to_string(), endpoint.to_string(), status));
    }
}

/// Two healthy, registered, online GPUs (ids 0 and 1)
pub fn two_gpu_fleet() -> Arc<InMemoryDeviceSource> {
    Arc::new(InMemoryDeviceSource::with_devices([
        DeviceSnapshot::idle(0, "gpu0", 24.0, 250.0),
        DeviceSnapshot::idle(1, "gpu1", 24.0, 250.0),
    ]))
}

pub struct TestEngine {
    pub engine: Arc<HealthEngine>,
    pub source: Arc<InMemoryDeviceSource>,
    pub sink: Arc<RecordingSink>,
    pub result_tx: broadcast::Sender<CheckResult>,
}

/// Engine over `source` with the default checks, a recording sink and a
/// result broadcast
pub fn engine_over(source: Arc<InMemoryDeviceSource>) -> TestEngine {
    let sink = Arc::new(RecordingSink::default());
    let (result_tx, _) = broadcast::channel(256);

    let engine = HealthEngine::new(
        Arc::new(CheckRegistry::with_defaults()),
        Arc::new(ResultStore::new()),
        source.clone(),
        sink.clone(),
    )
    .with_result_channel(result_tx.clone())
    .with_probe_timeout(Duration::from_millis(200));

    TestEngine {
        engine: Arc::new(engine),
        source,
        sink,
        result_tx,
    }
}

pub fn registration(gpu_id: u32, pool: &str, tags: &[&str]) -> Registration {
    Registration {
        gpu_id,
        name: format!("gpu{gpu_id}"),
        pool: pool.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
        ..Default::default()
    }
}

/// Ledger with every id enrolled in the default pool
pub fn ledger_with(ids: &[u32]) -> Arc<DeviceLedger> {
    let ledger = DeviceLedger::new();
    for &id in ids {
        ledger
            .register(registration(id, "default", &[]), "test")
            .unwrap();
    }
    Arc::new(ledger)
}

pub fn overheat(source: &InMemoryDeviceSource, gpu_id: u32) {
    source.update(gpu_id, |gpu| gpu.temperature_c = 92.0).unwrap();
}

pub fn cool_down(source: &InMemoryDeviceSource, gpu_id: u32) {
    source.update(gpu_id, |gpu| gpu.temperature_c = 40.0).unwrap();
}
