use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

pub const GPUTL_HOST: &str = "GPUTL_HOST";
pub const GPUTL_PORT: &str = "GPUTL_PORT";
pub const GPUTL_METRICS_PORT: &str = "GPUTL_METRICS_PORT";
pub const GPUTL_CHECK_INTERVAL: &str = "GPUTL_CHECK_INTERVAL";
pub const GPUTL_REGISTRY_PATH: &str = "GPUTL_REGISTRY_PATH";
pub const GPUTL_LOG_LEVEL: &str = "GPUTL_LOG_LEVEL";
pub const GPUTL_DAEMON_URL: &str = "GPUTL_DAEMON_URL";

pub const DEFAULT_DAEMON_URL: &str = "http://localhost:8080";

/// Parse an environment variable, ignoring (and logging) unparsable values
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid value {raw:?} for {key}");
            None
        }
    }
}

pub fn get_host() -> Option<String> {
    std::env::var(GPUTL_HOST).ok()
}

pub fn get_port() -> Option<u16> {
    env_parse(GPUTL_PORT)
}

pub fn get_metrics_port() -> Option<u16> {
    env_parse(GPUTL_METRICS_PORT)
}

/// Check interval in seconds; zero is rejected
pub fn get_check_interval() -> Option<u64> {
    env_parse(GPUTL_CHECK_INTERVAL).filter(|secs| *secs > 0)
}

pub fn get_registry_path() -> Option<PathBuf> {
    std::env::var_os(GPUTL_REGISTRY_PATH).map(PathBuf::from)
}

pub fn get_log_level() -> Option<String> {
    std::env::var(GPUTL_LOG_LEVEL).ok()
}
