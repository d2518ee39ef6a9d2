//! Device registration ledger
//!
//! Keeps which GPUs are enrolled, with pool, tags and free-form metadata.
//! Persisted as a pretty-printed JSON object keyed by GPU id.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_POOL: &str = "default";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("GPU {0} is already registered")]
    AlreadyRegistered(u32),

    #[error("GPU {0} is not registered")]
    NotFound(u32),

    #[error("failed to load ledger from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("failed to save ledger to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Active,
    Inactive,
    Degraded,
}

/// Enrollment request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub gpu_id: u32,

    #[serde(default)]
    pub uuid: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_pool")]
    pub pool: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_pool() -> String {
    DEFAULT_POOL.to_string()
}

/// An enrolled device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub gpu_id: u32,
    pub uuid: String,
    pub name: String,
    pub pool: String,
    pub tags: BTreeSet<String>,
    pub metadata: BTreeMap<String, String>,
    pub registered_at: DateTime<Utc>,
    pub registered_by: String,
    pub last_health_check: Option<DateTime<Utc>>,
    pub status: LedgerStatus,
}

impl DeviceRecord {
    /// Fresh `active` record for `request`
    pub fn new(request: Registration, registered_by: impl Into<String>) -> Self {
        let pool = if request.pool.is_empty() {
            default_pool()
        } else {
            request.pool
        };

        Self {
            gpu_id: request.gpu_id,
            uuid: request.uuid,
            name: request.name,
            pool,
            tags: request.tags,
            metadata: request.metadata,
            registered_at: Utc::now(),
            registered_by: registered_by.into(),
            last_health_check: None,
            status: LedgerStatus::Active,
        }
    }
}

#[derive(Debug, Default)]
pub struct DeviceLedger {
    records: RwLock<BTreeMap<u32, DeviceRecord>>,

    /// Held for the duration of one [`DeviceLedger::save_async`]
    persist: tokio::sync::Mutex<()>,
}

impl DeviceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        request: Registration,
        registered_by: impl Into<String>,
    ) -> LedgerResult<DeviceRecord> {
        let mut records = self.records.write();
        if records.contains_key(&request.gpu_id) {
            return Err(LedgerError::AlreadyRegistered(request.gpu_id));
        }

        let record = DeviceRecord::new(request, registered_by);
        records.insert(record.gpu_id, record.clone());
        info!(
            "registered GPU {} in pool {} by {}",
            record.gpu_id, record.pool, record.registered_by
        );
        Ok(record)
    }

    pub fn unregister(&self, gpu_id: u32) -> LedgerResult<DeviceRecord> {
        let record = self
            .records
            .write()
            .remove(&gpu_id)
            .ok_or(LedgerError::NotFound(gpu_id))?;
        info!("unregistered GPU {gpu_id}");
        Ok(record)
    }

    pub fn get(&self, gpu_id: u32) -> LedgerResult<DeviceRecord> {
        self.records
            .read()
            .get(&gpu_id)
            .cloned()
            .ok_or(LedgerError::NotFound(gpu_id))
    }

    pub fn contains(&self, gpu_id: u32) -> bool {
        self.records.read().contains_key(&gpu_id)
    }

    /// All records in id order
    pub fn list(&self) -> Vec<DeviceRecord> {
        self.records.read().values().cloned().collect()
    }

    pub fn find_by_pool(&self, pool: &str) -> Vec<DeviceRecord> {
        self.filtered(|record| record.pool == pool)
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<DeviceRecord> {
        self.filtered(|record| record.tags.contains(tag))
    }

    fn filtered(&self, keep: impl Fn(&DeviceRecord) -> bool) -> Vec<DeviceRecord> {
        self.records
            .read()
            .values()
            .filter(|record| keep(record))
            .cloned()
            .collect()
    }

    /// Set the status and stamp the health-check time
    pub fn update_status(&self, gpu_id: u32, status: LedgerStatus) -> LedgerResult<DeviceRecord> {
        self.modify(gpu_id, |record| {
            record.status = status;
            record.last_health_check = Some(Utc::now());
        })
    }

    pub fn touch_health_check(&self, gpu_id: u32) -> LedgerResult<DeviceRecord> {
        self.modify(gpu_id, |record| record.last_health_check = Some(Utc::now()))
    }

    fn modify(
        &self,
        gpu_id: u32,
        f: impl FnOnce(&mut DeviceRecord),
    ) -> LedgerResult<DeviceRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(&gpu_id).ok_or(LedgerError::NotFound(gpu_id))?;
        f(record);
        Ok(record.clone())
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn encode(&self, path: &Path) -> LedgerResult<(String, usize)> {
        let snapshot: BTreeMap<String, DeviceRecord> = self
            .records
            .read()
            .iter()
            .map(|(id, record)| (id.to_string(), record.clone()))
            .collect();

        let json = serde_json::to_string_pretty(&snapshot).map_err(|e| LedgerError::Save {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        Ok((json, snapshot.len()))
    }

    /// Write the ledger atomically (temp file + rename)
    pub fn save(&self, path: impl AsRef<Path>) -> LedgerResult<()> {
        let path = path.as_ref();
        let (json, count) = self.encode(path)?;
        write_atomic(path, json)?;

        debug!("saved {count} ledger records to {}", path.display());
        Ok(())
    }

    /// [`DeviceLedger::save`] with the file I/O on the blocking pool
    ///
    /// Concurrent calls are serialized; each snapshots the records only once
    /// it holds the write slot.
    pub async fn save_async(&self, path: impl Into<PathBuf>) -> LedgerResult<()> {
        let _slot = self.persist.lock().await;

        let path = path.into();
        let (json, count) = self.encode(&path)?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, json))
            .await
            .map_err(|e| LedgerError::Save {
                path: path.clone(),
                source: io::Error::other(e),
            })??;

        debug!("saved {count} ledger records to {}", path.display());
        Ok(())
    }

    /// Read a ledger written by [`DeviceLedger::save`]; a missing file is empty
    pub fn load(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| LedgerError::Load {
            path: path.to_path_buf(),
            reason,
        };

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no ledger at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(load_err(e.to_string())),
        };

        let stored: BTreeMap<String, DeviceRecord> =
            serde_json::from_str(&contents).map_err(|e| load_err(e.to_string()))?;

        let mut records = BTreeMap::new();
        for (key, record) in stored {
            let id: u32 = key
                .parse()
                .map_err(|_| load_err(format!("invalid GPU id key {key:?}")))?;
            if id != record.gpu_id {
                return Err(load_err(format!(
                    "key {id} does not match record gpu_id {}",
                    record.gpu_id
                )));
            }
            records.insert(id, record);
        }

        info!("loaded {} ledger records from {}", records.len(), path.display());
        Ok(Self {
            records: RwLock::new(records),
            ..Self::default()
        })
    }
}

fn write_atomic(path: &Path, json: String) -> LedgerResult<()> {
    let save_err = |source: io::Error| LedgerError::Save {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(save_err)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(save_err)?;
    fs::rename(&tmp, path).map_err(save_err)
}
