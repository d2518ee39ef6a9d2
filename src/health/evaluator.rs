//! Threshold classification
//!
//! Pure functions: given a check and a snapshot, produce a [`CheckResult`].
//! Comparisons are inclusive and critical wins over warning.

use chrono::Utc;

use super::check::{CheckConfig, CheckResult, CheckType, HealthStatus};
use crate::device::{DeviceError, DeviceSnapshot};

/// Classify `observed` against a warning/critical pair
pub fn classify(observed: f64, warning: f64, critical: f64) -> HealthStatus {
    if observed >= critical {
        HealthStatus::Unhealthy
    } else if observed >= warning {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// `100 * part / whole`, or `None` when `whole` can't be divided by
fn percent_of(part: f64, whole: f64) -> Option<f64> {
    if whole.is_finite() && whole > 0.0 {
        Some(100.0 * part / whole)
    } else {
        None
    }
}

pub fn evaluate(config: &CheckConfig, snapshot: &DeviceSnapshot) -> CheckResult {
    let (status, value, threshold, message) = match &config.check_type {
        CheckType::Temperature => temperature(config, snapshot),
        CheckType::Power => power(config, snapshot),
        CheckType::Memory => memory(config, snapshot),
        CheckType::Other(kind) => (
            HealthStatus::Unknown,
            0.0,
            config.critical_threshold,
            format!("unknown check type: {kind}"),
        ),
    };

    CheckResult {
        check_name: config.name.clone(),
        gpu_id: snapshot.id,
        status,
        value,
        threshold,
        message,
        timestamp: Utc::now(),
        tick: 0,
    }
}

/// Evaluate against the outcome of a device lookup
///
/// A failed lookup becomes an `unhealthy` result for this device only.
pub fn evaluate_lookup(
    config: &CheckConfig,
    gpu_id: u32,
    lookup: Result<&DeviceSnapshot, &DeviceError>,
) -> CheckResult {
    match lookup {
        Ok(snapshot) => evaluate(config, snapshot),
        Err(err) => CheckResult {
            check_name: config.name.clone(),
            gpu_id,
            status: HealthStatus::Unhealthy,
            value: 0.0,
            threshold: config.critical_threshold,
            message: format!("device error: {err}"),
            timestamp: Utc::now(),
            tick: 0,
        },
    }
}

type Classified = (HealthStatus, f64, f64, String);

fn temperature(config: &CheckConfig, snapshot: &DeviceSnapshot) -> Classified {
    let temp = snapshot.temperature_c;
    let status = classify(temp, config.warning_threshold, config.critical_threshold);

    let message = match status {
        HealthStatus::Unhealthy => format!(
            "critical temperature: {temp:.1}°C >= {:.1}°C",
            config.critical_threshold
        ),
        HealthStatus::Degraded => format!(
            "high temperature: {temp:.1}°C >= {:.1}°C",
            config.warning_threshold
        ),
        _ => format!("temperature normal: {temp:.1}°C"),
    };

    (status, temp, config.critical_threshold, message)
}

fn power(config: &CheckConfig, snapshot: &DeviceSnapshot) -> Classified {
    let usage = snapshot.power_usage_w;
    let limit = snapshot.power_limit_w;

    let Some(percent) = percent_of(usage, limit) else {
        return (
            HealthStatus::Unknown,
            usage,
            config.warning_threshold,
            format!("power limit unavailable: {limit}W"),
        );
    };

    let status = classify(percent, config.warning_threshold, config.critical_threshold);
    let label = match status {
        HealthStatus::Unhealthy => "critical power usage",
        HealthStatus::Degraded => "high power usage",
        _ => "power usage normal",
    };

    let message = format!("{label}: {usage:.1}W ({percent:.1}% of {limit:.1}W limit)");
    (status, usage, config.warning_threshold, message)
}

fn memory(config: &CheckConfig, snapshot: &DeviceSnapshot) -> Classified {
    let used = snapshot.used_memory_gb;
    let total = snapshot.total_memory_gb;
    let headroom = 100.0 - config.warning_threshold;

    let Some(percent) = percent_of(used, total) else {
        return (
            HealthStatus::Unknown,
            used,
            headroom,
            format!("total memory unavailable: {total}GB"),
        );
    };

    let status = classify(percent, config.warning_threshold, config.critical_threshold);
    let label = match status {
        HealthStatus::Unhealthy => "critical memory usage",
        HealthStatus::Degraded => "high memory usage",
        _ => "memory usage normal",
    };

    let message = format!("{label}: {used:.1}/{total:.1}GB ({percent:.1}% used)");
    (status, used, headroom, message)
}
