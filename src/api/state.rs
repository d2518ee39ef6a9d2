//! Shared state passed to every handler

use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use crate::health::HealthEngine;
use crate::ledger::DeviceLedger;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<HealthEngine>,

    pub ledger: Arc<DeviceLedger>,

    /// Where to persist the ledger after API mutations; `None` keeps it in memory
    pub ledger_path: Option<PathBuf>,
}

impl ApiState {
    pub fn new(engine: Arc<HealthEngine>, ledger: Arc<DeviceLedger>) -> Self {
        Self {
            engine,
            ledger,
            ledger_path: None,
        }
    }

    pub fn with_ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    /// Write the ledger to disk if a path is configured
    ///
    /// The write runs on the blocking pool. A failed write is logged; the
    /// in-memory change stands.
    pub async fn persist_ledger(&self) {
        if let Some(path) = &self.ledger_path
            && let Err(e) = self.ledger.save_async(path.clone()).await
        {
            error!("{e}");
        }
    }
}
