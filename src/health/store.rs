//! Latest result per (check, device)

use std::collections::HashMap;

use parking_lot::RwLock;

use super::check::{CheckResult, ResultKey};
use super::error::{HealthError, HealthResult};

#[derive(Debug, Default)]
struct Inner {
    results: HashMap<ResultKey, CheckResult>,
    latest_tick: u64,
}

/// Overwrite-only store of the most recent [`CheckResult`] for each key
///
/// Writes from an older tick than the stored entry are rejected, so a slow
/// evaluation can never clobber a newer one.
#[derive(Debug, Default)]
pub struct ResultStore {
    inner: RwLock<Inner>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: CheckResult) -> HealthResult<()> {
        let mut inner = self.inner.write();
        let key = result.key();

        if let Some(stored) = inner.results.get(&key)
            && result.tick < stored.tick
        {
            return Err(HealthError::StaleResult {
                key,
                tick: result.tick,
                stored_tick: stored.tick,
            });
        }

        inner.latest_tick = inner.latest_tick.max(result.tick);
        inner.results.insert(key, result);
        Ok(())
    }

    pub fn latest(&self, check_name: &str, gpu_id: u32) -> HealthResult<CheckResult> {
        self.inner
            .read()
            .results
            .get(&ResultKey::new(check_name, gpu_id))
            .cloned()
            .ok_or_else(|| HealthError::ResultNotFound {
                check_name: check_name.to_string(),
                gpu_id,
            })
    }

    /// Copy of every stored result
    pub fn all(&self) -> HashMap<ResultKey, CheckResult> {
        self.inner.read().results.clone()
    }

    /// Results for one device, sorted by check name
    pub fn for_device(&self, gpu_id: u32) -> Vec<CheckResult> {
        let mut results: Vec<_> = self
            .inner
            .read()
            .results
            .values()
            .filter(|result| result.gpu_id == gpu_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.check_name.cmp(&b.check_name));
        results
    }

    /// Highest tick ever recorded
    pub fn latest_tick(&self) -> u64 {
        self.inner.read().latest_tick
    }

    /// Drop every result of one device, returning what was removed
    pub fn remove_device(&self, gpu_id: u32) -> Vec<CheckResult> {
        let mut inner = self.inner.write();
        let keys: Vec<ResultKey> = inner
            .results
            .keys()
            .filter(|key| key.gpu_id == gpu_id)
            .cloned()
            .collect();

        keys.iter()
            .filter_map(|key| inner.results.remove(key))
            .collect()
    }

    pub fn clear(&self) {
        self.inner.write().results.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().results.is_empty()
    }
}
