//! Check definitions and results

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of quantity a check classifies
///
/// Unrecognized kinds are kept verbatim so a config written for a newer
/// daemon still loads; the evaluator reports them as `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckType {
    Temperature,
    Power,
    Memory,
    Other(String),
}

impl CheckType {
    pub fn as_str(&self) -> &str {
        match self {
            CheckType::Temperature => "temperature",
            CheckType::Power => "power",
            CheckType::Memory => "memory",
            CheckType::Other(kind) => kind,
        }
    }
}

impl From<String> for CheckType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "temperature" => CheckType::Temperature,
            "power" => CheckType::Power,
            "memory" => CheckType::Memory,
            _ => CheckType::Other(value),
        }
    }
}

impl From<&str> for CheckType {
    fn from(value: &str) -> Self {
        CheckType::from(value.to_string())
    }
}

impl From<CheckType> for String {
    fn from(value: CheckType) -> Self {
        match value {
            CheckType::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a single named check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,

    pub check_type: CheckType,

    /// Advisory interval; the scheduler runs every enabled check each tick
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    pub warning_threshold: f64,

    pub critical_threshold: f64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_interval_secs() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

impl CheckConfig {
    pub fn new(
        name: impl Into<String>,
        check_type: impl Into<CheckType>,
        warning_threshold: f64,
        critical_threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            check_type: check_type.into(),
            interval_secs: default_interval_secs(),
            warning_threshold,
            critical_threshold,
            enabled: true,
        }
    }

    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Three-tier classification plus `Unknown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Gauge encoding exported as `health_check_status`
    pub fn metric_value(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 1.0,
            HealthStatus::Degraded => 0.5,
            HealthStatus::Unhealthy => 0.0,
            HealthStatus::Unknown => -1.0,
        }
    }

    /// Ordering used to pick a device's worst result
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key of the result store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResultKey {
    pub check_name: String,
    pub gpu_id: u32,
}

impl ResultKey {
    pub fn new(check_name: impl Into<String>, gpu_id: u32) -> Self {
        Self {
            check_name: check_name.into(),
            gpu_id,
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on GPU {}", self.check_name, self.gpu_id)
    }
}

/// Outcome of one check against one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub gpu_id: u32,
    pub status: HealthStatus,

    /// Measured quantity
    pub value: f64,

    /// Boundary reported alongside the value
    pub threshold: f64,

    pub message: String,
    pub timestamp: DateTime<Utc>,

    /// Scheduler tick that produced this result (0 outside the scheduler)
    #[serde(default)]
    pub tick: u64,
}

impl CheckResult {
    pub fn key(&self) -> ResultKey {
        ResultKey::new(self.check_name.clone(), self.gpu_id)
    }
}
