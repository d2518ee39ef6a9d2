//! Registry of named check definitions

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::check::{CheckConfig, CheckType};
use super::error::{HealthError, HealthResult};

/// Checks the daemon registers when no `checks` list is configured
pub fn default_checks() -> Vec<CheckConfig> {
    vec![
        CheckConfig::new("temperature_check", CheckType::Temperature, 75.0, 85.0).with_interval(10),
        CheckConfig::new("power_check", CheckType::Power, 80.0, 95.0).with_interval(60),
        CheckConfig::new("memory_check", CheckType::Memory, 80.0, 95.0).with_interval(30),
    ]
}

/// Name → check configuration
///
/// Written rarely (startup, API registration) and read on every tick, so a
/// single reader/writer lock is enough.
#[derive(Debug, Default)]
pub struct CheckRegistry {
    checks: RwLock<HashMap<String, CheckConfig>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self::from_configs(default_checks())
    }

    pub fn from_configs(configs: impl IntoIterator<Item = CheckConfig>) -> Self {
        let registry = Self::new();
        for config in configs {
            registry.register(config);
        }
        registry
    }

    /// Insert or replace a check, returning the replaced definition
    pub fn register(&self, config: CheckConfig) -> Option<CheckConfig> {
        debug!(
            "registering check {} ({}, warn {}, crit {}, enabled {})",
            config.name,
            config.check_type,
            config.warning_threshold,
            config.critical_threshold,
            config.enabled
        );
        self.checks.write().insert(config.name.clone(), config)
    }

    pub fn get(&self, name: &str) -> HealthResult<CheckConfig> {
        self.checks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| HealthError::CheckNotFound(name.to_string()))
    }

    /// All checks, sorted by name
    pub fn list(&self) -> Vec<CheckConfig> {
        let mut checks: Vec<_> = self.checks.read().values().cloned().collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        checks
    }

    pub fn list_enabled(&self) -> Vec<CheckConfig> {
        let mut checks: Vec<_> = self
            .checks
            .read()
            .values()
            .filter(|check| check.enabled)
            .cloned()
            .collect();
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        checks
    }

    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.read().is_empty()
    }
}
