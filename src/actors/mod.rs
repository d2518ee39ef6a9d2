//! Long-running tasks of the daemon
//!
//! ```text
//!   SchedulerActor ──tick──▶ HealthEngine ──▶ ResultStore
//!        │                        │
//!        │ ledger follow-up       │ broadcast<CheckResult>
//!        ▼                        ▼
//!   DeviceLedger              AlertActor ──▶ webhook
//! ```
//!
//! Each actor owns its state, takes commands over an mpsc channel and
//! answers queries over oneshot channels. Handles are cheap to clone.

pub mod alert;
pub mod messages;
pub mod scheduler;
