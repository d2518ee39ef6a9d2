//! Metrics sink
//!
//! The engine and the API report through [`MetricsSink`]; the daemon plugs in
//! a [`PrometheusSink`] whose registry is served as text on the metrics port.
//! Tests and metrics-disabled setups use [`NoopSink`].

use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, Registry, TextEncoder,
    register_gauge_vec_with_registry, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry,
};
use tracing::trace;

use crate::device::DeviceSnapshot;
use crate::health::{CheckResult, ResultKey};
use crate::ledger::DeviceRecord;

pub trait MetricsSink: Send + Sync {
    /// Telemetry of a freshly read device
    fn observe_device(&self, snapshot: &DeviceSnapshot);

    /// Outcome and latency of one check evaluation
    fn observe_check(&self, result: &CheckResult, latency: Duration);

    /// Device entered (`registered == true`) or left the ledger
    fn observe_registration(&self, record: &DeviceRecord, registered: bool);

    /// Drop the status series of a result that no longer exists
    fn forget_check(&self, key: &ResultKey);

    /// One served API request
    fn observe_request(&self, method: &str, endpoint: &str, status: u16, latency: Duration);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn observe_device(&self, _snapshot: &DeviceSnapshot) {}
    fn observe_check(&self, _result: &CheckResult, _latency: Duration) {}
    fn observe_registration(&self, _record: &DeviceRecord, _registered: bool) {}
    fn forget_check(&self, _key: &ResultKey) {}
    fn observe_request(&self, _method: &str, _endpoint: &str, _status: u16, _latency: Duration) {}
}

const DEVICE_LABELS: &[&str] = &["gpu_id", "gpu_name"];

/// Prometheus-backed sink owning its own registry
#[derive(Clone)]
pub struct PrometheusSink {
    registry: Registry,

    gpu_temperature: GaugeVec,
    gpu_power_usage: GaugeVec,
    gpu_power_limit: GaugeVec,
    gpu_memory_used: GaugeVec,
    gpu_memory_total: GaugeVec,
    gpu_utilization: GaugeVec,
    gpu_online: GaugeVec,
    gpu_registered: GaugeVec,

    check_status: GaugeVec,
    check_latency: HistogramVec,
    check_runs: IntCounterVec,

    api_requests: IntCounterVec,
    api_latency: HistogramVec,
}

impl PrometheusSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let gpu_temperature = register_gauge_vec_with_registry!(
            "gpu_temperature_celsius",
            "GPU temperature in Celsius",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_power_usage = register_gauge_vec_with_registry!(
            "gpu_power_usage_watts",
            "GPU power usage in watts",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_power_limit = register_gauge_vec_with_registry!(
            "gpu_power_limit_watts",
            "GPU power limit in watts",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_memory_used = register_gauge_vec_with_registry!(
            "gpu_memory_used_gb",
            "GPU memory in use in GB",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_memory_total = register_gauge_vec_with_registry!(
            "gpu_memory_total_gb",
            "Total GPU memory in GB",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_utilization = register_gauge_vec_with_registry!(
            "gpu_utilization_percent",
            "GPU utilization percentage",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_online = register_gauge_vec_with_registry!(
            "gpu_online",
            "GPU online status (1=online, 0=offline)",
            DEVICE_LABELS,
            registry
        )?;

        let gpu_registered = register_gauge_vec_with_registry!(
            "gpu_registered",
            "GPU registration status (1=registered)",
            &["gpu_id", "gpu_name", "pool"],
            registry
        )?;

        let check_status = register_gauge_vec_with_registry!(
            "health_check_status",
            "Health check status (1=healthy, 0.5=degraded, 0=unhealthy, -1=unknown)",
            &["gpu_id", "check_name"],
            registry
        )?;

        let check_latency = register_histogram_vec_with_registry!(
            "health_check_latency_seconds",
            "Health check evaluation latency in seconds",
            &["check_name"],
            vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0],
            registry
        )?;

        let check_runs = register_int_counter_vec_with_registry!(
            "health_check_runs_total",
            "Health check evaluations by resulting status",
            &["status"],
            registry
        )?;

        let api_requests = register_int_counter_vec_with_registry!(
            "api_requests_total",
            "API requests by method, endpoint and status",
            &["method", "endpoint", "status"],
            registry
        )?;

        let api_latency = register_histogram_vec_with_registry!(
            "api_latency_seconds",
            "API request latency in seconds",
            &["method", "endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0],
            registry
        )?;

        Ok(Self {
            registry,
            gpu_temperature,
            gpu_power_usage,
            gpu_power_limit,
            gpu_memory_used,
            gpu_memory_total,
            gpu_utilization,
            gpu_online,
            gpu_registered,
            check_status,
            check_latency,
            check_runs,
            api_requests,
            api_latency,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current state in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusSink {
    fn observe_device(&self, snapshot: &DeviceSnapshot) {
        let id = snapshot.id.to_string();
        let labels = [id.as_str(), snapshot.name.as_str()];

        self.gpu_temperature.with_label_values(&labels).set(snapshot.temperature_c);
        self.gpu_power_usage.with_label_values(&labels).set(snapshot.power_usage_w);
        self.gpu_power_limit.with_label_values(&labels).set(snapshot.power_limit_w);
        self.gpu_memory_used.with_label_values(&labels).set(snapshot.used_memory_gb);
        self.gpu_memory_total.with_label_values(&labels).set(snapshot.total_memory_gb);
        self.gpu_utilization
            .with_label_values(&labels)
            .set(snapshot.utilization_percent);
        self.gpu_online
            .with_label_values(&labels)
            .set(if snapshot.online { 1.0 } else { 0.0 });
    }

    fn observe_check(&self, result: &CheckResult, latency: Duration) {
        let id = result.gpu_id.to_string();

        self.check_status
            .with_label_values(&[id.as_str(), result.check_name.as_str()])
            .set(result.status.metric_value());
        self.check_latency
            .with_label_values(&[result.check_name.as_str()])
            .observe(latency.as_secs_f64());
        self.check_runs
            .with_label_values(&[result.status.as_str()])
            .inc();
    }

    fn observe_registration(&self, record: &DeviceRecord, registered: bool) {
        let id = record.gpu_id.to_string();
        let labels = [id.as_str(), record.name.as_str(), record.pool.as_str()];

        if registered {
            self.gpu_registered.with_label_values(&labels).set(1.0);
        } else if self.gpu_registered.remove_label_values(&labels).is_err() {
            trace!("GPU {}: no registration series to remove", record.gpu_id);
        }
    }

    fn forget_check(&self, key: &ResultKey) {
        let id = key.gpu_id.to_string();

        if self
            .check_status
            .remove_label_values(&[id.as_str(), key.check_name.as_str()])
            .is_err()
        {
            trace!("{key}: no status series to remove");
        }
    }

    fn observe_request(&self, method: &str, endpoint: &str, status: u16, latency: Duration) {
        let status = status.to_string();

        self.api_requests
            .with_label_values(&[method, endpoint, status.as_str()])
            .inc();
        self.api_latency
            .with_label_values(&[method, endpoint])
            .observe(latency.as_secs_f64());
    }
}
