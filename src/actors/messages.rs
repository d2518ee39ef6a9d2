//! Message types for actor communication
//!
//! Commands travel over per-actor mpsc channels; replies come back on oneshot
//! channels. Check results fan out over a broadcast channel of
//! [`CheckResult`](crate::health::CheckResult).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::health::{HealthStatus, ResultKey, TickReport};

/// Commands accepted by the scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a tick immediately, outside the timer
    RunNow {
        respond_to: oneshot::Sender<TickReport>,
    },

    /// Change the tick period; the timer restarts from now
    UpdateInterval { interval_secs: u64 },

    /// Stop after the tick in progress (if any)
    Shutdown,
}

/// Commands accepted by the alert actor
#[derive(Debug)]
pub enum AlertCommand {
    GetState {
        key: ResultKey,
        respond_to: oneshot::Sender<Option<AlertState>>,
    },

    /// Suppress notifications for a maintenance window
    MuteAlerts { duration_secs: u64 },

    UnmuteAlerts,

    Shutdown,
}

/// Escalation state for one (check, device) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub key: ResultKey,
    pub consecutive_unhealthy: usize,
    pub last_status: HealthStatus,
    pub last_evaluation: DateTime<Utc>,
}
