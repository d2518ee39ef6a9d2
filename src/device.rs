//! Device telemetry source
//!
//! The health engine never queries hardware itself. It reads point-in-time
//! [`DeviceSnapshot`]s through the [`DeviceSource`] trait, so the in-memory
//! fleet used today and a hardware-backed source are interchangeable.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Point-in-time view of a single device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    pub temperature_c: f64,
    pub power_usage_w: f64,
    pub power_limit_w: f64,
    pub used_memory_gb: f64,
    pub total_memory_gb: f64,
    #[serde(default)]
    pub utilization_percent: f64,
    pub online: bool,
    pub registered: bool,
}

impl DeviceSnapshot {
    /// Idle device with the given memory size and power limit
    pub fn idle(id: u32, name: impl Into<String>, total_memory_gb: f64, power_limit_w: f64) -> Self {
        Self {
            id,
            name: name.into(),
            uuid: String::new(),
            temperature_c: 35.0,
            power_usage_w: 10.0,
            power_limit_w,
            used_memory_gb: 0.0,
            total_memory_gb,
            utilization_percent: 0.0,
            online: true,
            registered: true,
        }
    }
}

/// Errors raised while reading device telemetry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("GPU {0} not found")]
    NotFound(u32),

    #[error("device source unavailable: {0}")]
    Unavailable(String),

    #[error("device query timed out after {0:?}")]
    Timeout(Duration),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Read access to device telemetry
///
/// Implementations must answer quickly; the engine bounds every call with a
/// timeout and treats an expired call as an unreachable device.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Snapshot of every known device
    async fn list_devices(&self) -> DeviceResult<Vec<DeviceSnapshot>>;

    /// Fresh snapshot of one device
    async fn get_device(&self, id: u32) -> DeviceResult<DeviceSnapshot>;

    /// Reflect a ledger (un)registration in the source's `registered` flag.
    ///
    /// Sources that derive the flag from elsewhere keep this no-op.
    async fn set_registered(&self, _id: u32, _registered: bool) -> DeviceResult<()> {
        Ok(())
    }
}

/// Device source backed by an in-memory table
///
/// Stands in for the hardware query layer: the daemon seeds it with a mocked
/// fleet and tests drive telemetry through [`InMemoryDeviceSource::update`].
#[derive(Debug, Default)]
pub struct InMemoryDeviceSource {
    devices: RwLock<BTreeMap<u32, DeviceSnapshot>>,
}

impl InMemoryDeviceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = DeviceSnapshot>) -> Self {
        let source = Self::new();
        for device in devices {
            source.upsert(device);
        }
        source
    }

    /// The single development GPU the daemon reports without hardware access
    pub fn mock_fleet() -> Self {
        let mut gpu = DeviceSnapshot::idle(0, "NVIDIA GeForce RTX 5070 Ti", 24.0, 250.0);
        gpu.uuid = "GPU-12345678-90ab-cdef-1234-567890abcdef".to_string();
        Self::with_devices([gpu])
    }

    /// Insert or replace a device
    pub fn upsert(&self, snapshot: DeviceSnapshot) {
        self.devices.write().insert(snapshot.id, snapshot);
    }

    /// Mutate a device in place
    pub fn update<F>(&self, id: u32, f: F) -> DeviceResult<()>
    where
        F: FnOnce(&mut DeviceSnapshot),
    {
        let mut devices = self.devices.write();
        let device = devices.get_mut(&id).ok_or(DeviceError::NotFound(id))?;
        f(device);
        Ok(())
    }

    pub fn remove(&self, id: u32) -> Option<DeviceSnapshot> {
        self.devices.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[async_trait]
impl DeviceSource for InMemoryDeviceSource {
    async fn list_devices(&self) -> DeviceResult<Vec<DeviceSnapshot>> {
        Ok(self.devices.read().values().cloned().collect())
    }

    async fn get_device(&self, id: u32) -> DeviceResult<DeviceSnapshot> {
        self.devices
            .read()
            .get(&id)
            .cloned()
            .ok_or(DeviceError::NotFound(id))
    }

    async fn set_registered(&self, id: u32, registered: bool) -> DeviceResult<()> {
        trace!("GPU {id}: registered flag -> {registered}");
        self.update(id, |device| device.registered = registered)
    }
}
