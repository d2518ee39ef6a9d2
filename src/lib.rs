//! GPU Ops Platform
//!
//! A daemon that tracks accelerator devices, evaluates their health against
//! configurable thresholds on a fixed tick and exposes the outcome over an
//! HTTP API and a Prometheus endpoint.
//!
//! ```text
//! SchedulerActor ──tick──▶ HealthEngine ──▶ DeviceSource (read)
//!                               │          ──▶ CheckRegistry (read)
//!                               │          ──▶ evaluator (compute)
//!                               ├────────────▶ ResultStore (write)
//!                               ├────────────▶ MetricsSink (write)
//!                               └─broadcast──▶ AlertActor ──▶ webhook
//! ```

pub mod actors;
pub mod alerts;
pub mod api;
pub mod client;
pub mod config;
pub mod device;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod util;

pub use device::{DeviceError, DeviceSnapshot, DeviceSource, InMemoryDeviceSource};
pub use health::{
    CheckConfig, CheckRegistry, CheckResult, CheckType, HealthEngine, HealthError, HealthStatus,
    ResultKey, ResultStore,
};
pub use ledger::{DeviceLedger, DeviceRecord, LedgerError, LedgerStatus, Registration};
pub use metrics::{MetricsSink, NoopSink, PrometheusSink};
