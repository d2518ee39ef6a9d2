//! One evaluation pass over the fleet
//!
//! ```text
//! list_devices → filter online && registered → get_device (concurrent, bounded)
//!     → evaluate every enabled check → ResultStore → MetricsSink → broadcast
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, instrument, trace, warn};

use super::check::{CheckConfig, CheckResult, HealthStatus};
use super::error::{HealthError, HealthResult};
use super::evaluator::evaluate_lookup;
use super::registry::CheckRegistry;
use super::store::ResultStore;
use crate::device::{DeviceError, DeviceResult, DeviceSnapshot, DeviceSource};
use crate::metrics::MetricsSink;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,

    /// Devices returned by the source
    pub devices_seen: usize,

    /// Devices that were online and registered
    pub devices_evaluated: usize,

    /// Results recorded in the store
    pub results: usize,

    pub unhealthy: usize,

    /// Results dropped as stale
    pub skipped: usize,

    /// Worst status per evaluated device
    pub device_status: Vec<(u32, HealthStatus)>,
}

pub struct HealthEngine {
    registry: Arc<CheckRegistry>,
    store: Arc<ResultStore>,
    source: Arc<dyn DeviceSource>,
    metrics: Arc<dyn MetricsSink>,
    result_tx: Option<broadcast::Sender<CheckResult>>,
    probe_timeout: Duration,
}

impl HealthEngine {
    pub fn new(
        registry: Arc<CheckRegistry>,
        store: Arc<ResultStore>,
        source: Arc<dyn DeviceSource>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            registry,
            store,
            source,
            metrics,
            result_tx: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Publish every recorded result on `tx`
    pub fn with_result_channel(mut self, tx: broadcast::Sender<CheckResult>) -> Self {
        self.result_tx = Some(tx);
        self
    }

    /// Bound for every device source call
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<CheckRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn DeviceSource> {
        &self.source
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    /// Fresh snapshot of one device, bounded by the probe timeout
    pub async fn snapshot(&self, gpu_id: u32) -> DeviceResult<DeviceSnapshot> {
        timeout(self.probe_timeout, self.source.get_device(gpu_id))
            .await
            .unwrap_or(Err(DeviceError::Timeout(self.probe_timeout)))
    }

    /// Every device the source knows, bounded by the probe timeout
    pub async fn list_devices(&self) -> DeviceResult<Vec<DeviceSnapshot>> {
        timeout(self.probe_timeout, self.source.list_devices())
            .await
            .unwrap_or(Err(DeviceError::Timeout(self.probe_timeout)))
    }

    /// Evaluate every enabled check against every eligible device
    #[instrument(skip(self))]
    pub async fn run_tick(&self, tick: u64) -> TickReport {
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        let devices = match self.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                error!("failed to list devices: {e}");
                return report;
            }
        };
        report.devices_seen = devices.len();

        // gauges follow every listed device, evaluated or not
        let mut eligible = Vec::new();
        for device in &devices {
            if device.online && device.registered {
                eligible.push(device.id);
            } else {
                self.metrics.observe_device(device);
            }
        }
        report.devices_evaluated = eligible.len();

        let checks = self.registry.list_enabled();
        if checks.is_empty() {
            debug!("no enabled checks");
        }

        let lookups = join_all(eligible.iter().map(|&gpu_id| async move {
            let started = Instant::now();
            let lookup = self.snapshot(gpu_id).await;
            (gpu_id, lookup, started.elapsed())
        }))
        .await;

        for (gpu_id, lookup, lookup_latency) in lookups {
            match &lookup {
                Ok(snapshot) => self.metrics.observe_device(snapshot),
                Err(e) => {
                    warn!("GPU {gpu_id}: snapshot failed: {e}");
                    if let Some(listed) = devices.iter().find(|device| device.id == gpu_id) {
                        self.metrics.observe_device(listed);
                    }
                }
            }

            let mut worst = HealthStatus::Healthy;
            for check in &checks {
                let started = Instant::now();
                let mut result = evaluate_lookup(check, gpu_id, lookup.as_ref());
                result.tick = tick;
                let latency = lookup_latency + started.elapsed();

                worst = worst.worst(result.status);
                if result.status == HealthStatus::Unhealthy {
                    report.unhealthy += 1;
                }

                match self.finish(result, latency) {
                    Ok(()) => report.results += 1,
                    Err(e) => {
                        warn!("dropping result: {e}");
                        report.skipped += 1;
                    }
                }
            }

            if !checks.is_empty() {
                report.device_status.push((gpu_id, worst));
            }
        }

        debug!(
            "tick {tick}: {} devices seen, {} evaluated, {} results ({} unhealthy, {} skipped)",
            report.devices_seen,
            report.devices_evaluated,
            report.results,
            report.unhealthy,
            report.skipped
        );

        report
    }

    /// Drop the stored results and status series of a device that left the ledger
    pub fn forget_device(&self, gpu_id: u32) {
        let removed = self.store.remove_device(gpu_id);
        for result in &removed {
            self.metrics.forget_check(&result.key());
        }
        debug!("GPU {gpu_id}: forgot {} results", removed.len());
    }

    /// Run one named check against one device outside the schedule
    #[instrument(skip(self))]
    pub async fn run_check(&self, check_name: &str, gpu_id: u32) -> HealthResult<CheckResult> {
        let check: CheckConfig = self.registry.get(check_name)?;
        if !check.enabled {
            return Err(HealthError::CheckDisabled(check_name.to_string()));
        }

        let started = Instant::now();
        let lookup = self.snapshot(gpu_id).await;
        if let Ok(snapshot) = &lookup {
            self.metrics.observe_device(snapshot);
        }

        let mut result = evaluate_lookup(&check, gpu_id, lookup.as_ref());
        result.tick = self.store.latest_tick();

        self.finish(result.clone(), started.elapsed())?;
        Ok(result)
    }

    /// Record, observe, alert and publish a single result
    fn finish(&self, result: CheckResult, latency: Duration) -> HealthResult<()> {
        self.store.record(result.clone())?;
        self.metrics.observe_check(&result, latency);

        if result.status == HealthStatus::Unhealthy {
            warn!("ALERT: GPU {} - {}", result.gpu_id, result.message);
        }

        if let Some(tx) = &self.result_tx {
            match tx.send(result) {
                Ok(receivers) => trace!("published result to {receivers} receivers"),
                Err(_) => trace!("no receivers for result"),
            }
        }

        Ok(())
    }
}
