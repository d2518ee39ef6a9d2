//! Daemon configuration
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Files are JSON or TOML depending on their extension.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::health::CheckConfig;
use crate::health::registry::default_checks;
use crate::util;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub health: HealthConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub alerts: AlertsConfig,

    /// Replaces the built-in checks when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Vec<CheckConfig>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            enable_cors: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    pub registry_path: PathBuf,

    /// Consecutive unhealthy ticks before a device is taken out of service
    pub failed_threshold: usize,
    pub auto_unregister: bool,

    /// Refuse to start when the ledger file can't be read
    pub strict_ledger: bool,

    /// Upper bound for a single device query
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            registry_path: PathBuf::from("/var/lib/gputl/registry.json"),
            failed_threshold: 3,
            auto_unregister: false,
            strict_ledger: false,
            probe_timeout_ms: 2000,
        }
    }
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub host: IpAddr,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `gpu_ops=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Webhook>,

    /// Extra consecutive unhealthy results required before notifying
    pub grace: usize,
}

impl Config {
    /// Configured checks, or the built-in defaults
    pub fn checks(&self) -> Vec<CheckConfig> {
        self.checks.clone().unwrap_or_else(default_checks)
    }

    /// Apply `GPUTL_*` environment overrides
    pub fn apply_env(&mut self) {
        if let Some(host) = util::get_host() {
            match host.parse() {
                Ok(host) => self.server.host = host,
                Err(_) => debug!("ignoring invalid {} {host:?}", util::GPUTL_HOST),
            }
        }
        if let Some(port) = util::get_port() {
            self.server.port = port;
        }
        if let Some(port) = util::get_metrics_port() {
            self.metrics.port = port;
        }
        if let Some(secs) = util::get_check_interval() {
            self.health.check_interval_secs = secs;
        }
        if let Some(path) = util::get_registry_path() {
            self.health.registry_path = path;
        }
        if let Some(level) = util::get_log_level() {
            self.logging.level = level;
        }
    }
}

/// Read a JSON or TOML (by extension) configuration file
pub fn read_config_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: Config = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    } else {
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?
    };

    trace!("loaded config: {config:?}");
    Ok(config)
}

/// Candidate config files, most specific last
fn search_paths() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc/gputl")];
    if let Some(config_dir) = dirs::config_dir() {
        dirs.push(config_dir.join("gputl"));
    }
    dirs.push(PathBuf::from("."));

    dirs.into_iter()
        .flat_map(|dir| [dir.join("gputl.toml"), dir.join("gputl.json")])
        .collect()
}

/// Load the explicit file, or the first discovered one, then apply env overrides
///
/// An explicit path must exist; discovery falls back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let discovered = path.map(Path::to_path_buf).or_else(|| {
        search_paths()
            .into_iter()
            .rev()
            .find(|candidate| candidate.exists())
    });

    let mut config = match discovered {
        Some(path) => {
            debug!("using config file {}", path.display());
            read_config_file(&path)?
        }
        None => {
            debug!("no config file found, using defaults");
            Config::default()
        }
    };

    config.apply_env();
    Ok(config)
}

/// Write the default configuration (with the built-in checks spelled out) as TOML
pub fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let config = Config {
        checks: Some(default_checks()),
        ..Default::default()
    };

    let content = toml::to_string_pretty(&config).context("failed to serialize default config")?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    std::fs::write(path, content)
        .with_context(|| format!("failed to write config file: {}", path.display()))
}
