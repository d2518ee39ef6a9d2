//! Error types for registry, store and engine operations

use thiserror::Error;

use super::check::ResultKey;

pub type HealthResult<T> = Result<T, HealthError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HealthError {
    #[error("check {0} not registered")]
    CheckNotFound(String),

    #[error("no result found for check {check_name} on GPU {gpu_id}")]
    ResultNotFound { check_name: String, gpu_id: u32 },

    #[error("check {0} is disabled")]
    CheckDisabled(String),

    /// A result from an older tick arrived after a newer one
    #[error("stale result for {key}: tick {tick} is older than stored tick {stored_tick}")]
    StaleResult {
        key: ResultKey,
        tick: u64,
        stored_tick: u64,
    },
}
