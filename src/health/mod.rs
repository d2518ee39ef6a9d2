//! Health evaluation engine
//!
//! - [`registry::CheckRegistry`]: named check definitions
//! - [`evaluator`]: pure threshold classification
//! - [`store::ResultStore`]: latest result per (check, device)
//! - [`engine::HealthEngine`]: one evaluation pass over the fleet
//!
//! The periodic driver lives in [`crate::actors::scheduler`].

pub mod check;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod store;

pub use check::{CheckConfig, CheckResult, CheckType, HealthStatus, ResultKey};
pub use engine::{HealthEngine, TickReport};
pub use error::{HealthError, HealthResult};
pub use registry::CheckRegistry;
pub use store::ResultStore;
