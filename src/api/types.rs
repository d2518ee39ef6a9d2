//! Request and response bodies
//!
//! Shared by the server handlers and the `gputl` client so both sides agree
//! on the wire format.

use serde::{Deserialize, Serialize};

use crate::device::DeviceSnapshot;
use crate::health::{CheckConfig, CheckResult};
use crate::ledger::DeviceRecord;

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// One row of `GET /api/v1/gpus`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuSummary {
    pub id: u32,
    pub name: String,
    pub uuid: String,
    pub online: bool,
    pub registered: bool,

    /// Ledger pool, if the device is enrolled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpusResponse {
    pub gpus: Vec<GpuSummary>,
    pub count: usize,
}

/// `GET /api/v1/gpus/:id`: live telemetry, enrollment and latest results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuDetail {
    #[serde(flatten)]
    pub device: DeviceSnapshot,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration: Option<DeviceRecord>,

    #[serde(default)]
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChecksResponse {
    pub checks: Vec<CheckConfig>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsResponse {
    pub results: Vec<CheckResult>,
    pub count: usize,
}

/// Ledger records matching a pool or tag
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceRecord>,
    pub count: usize,
}

impl From<Vec<CheckConfig>> for ChecksResponse {
    fn from(checks: Vec<CheckConfig>) -> Self {
        Self {
            count: checks.len(),
            checks,
        }
    }
}

impl From<Vec<CheckResult>> for ResultsResponse {
    fn from(results: Vec<CheckResult>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

impl From<Vec<DeviceRecord>> for DevicesResponse {
    fn from(devices: Vec<DeviceRecord>) -> Self {
        Self {
            count: devices.len(),
            devices,
        }
    }
}
