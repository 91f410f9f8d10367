//! Validated, scoped attribute store with JSON file persistence.

use crate::error::AttributeError;
use crate::types::*;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};

/// Data version for schema migrations.
const DATA_VERSION: u32 = 1;

/// On-disk layout of the store file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: Vec<AttributeRecord>,
}

/// Scoped key-value store whose values are validated at write time.
///
/// Values are kept in memory and written through to a JSON file on every
/// change. Without a file path the store is memory-only.
pub struct AttributeStore {
    specs: HashMap<String, AttributeSpec>,
    data: RwLock<HashMap<AttributeKey, String>>,
    storage_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
    key_locks: DashMap<AttributeKey, Arc<Mutex<()>>>,
}

impl AttributeStore {
    /// Open a store backed by `storage_path`, loading existing records.
    pub async fn open(
        storage_path: impl Into<PathBuf>,
        specs: Vec<AttributeSpec>,
    ) -> Result<Arc<Self>, AttributeError> {
        let store = Self::build(Some(storage_path.into()), specs);
        store.load().await?;
        Ok(Arc::new(store))
    }

    /// Create a memory-only store.
    pub fn in_memory(specs: Vec<AttributeSpec>) -> Arc<Self> {
        Arc::new(Self::build(None, specs))
    }

    fn build(storage_path: Option<PathBuf>, specs: Vec<AttributeSpec>) -> Self {
        Self {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
            data: RwLock::new(HashMap::new()),
            storage_path,
            persist_lock: Mutex::new(()),
            key_locks: DashMap::new(),
        }
    }

    /// Definition of a registered attribute.
    pub fn spec(&self, attribute: &str) -> Option<&AttributeSpec> {
        self.specs.get(attribute)
    }

    /// Read a stored value. Missing keys are `None`, never an error.
    pub async fn get(&self, scope: Scope, entity: &str, attribute: &str) -> Option<String> {
        let key = AttributeKey::new(scope, entity, attribute);
        self.data.read().await.get(&key).cloned()
    }

    /// Validate and store a value, returning its canonical form.
    ///
    /// On a validation failure nothing is written.
    #[instrument(skip(self, raw))]
    pub async fn set(
        &self,
        scope: Scope,
        entity: &str,
        attribute: &str,
        raw: &str,
    ) -> Result<String, AttributeError> {
        let spec = self
            .spec(attribute)
            .ok_or_else(|| AttributeError::UnknownAttribute(attribute.to_string()))?;

        let value = spec.parse(raw).map_err(|reason| AttributeError::Validation {
            attribute: attribute.to_string(),
            value: raw.to_string(),
            reason,
        })?;

        let key = AttributeKey::new(scope, entity, attribute);
        let previous = self.data.write().await.insert(key.clone(), value.clone());

        if let Err(e) = self.persist().await {
            self.rollback(&key, previous, Some(&value)).await;
            return Err(e);
        }

        debug!("Stored {} = {}", key, value);
        Ok(value)
    }

    /// Remove a value. Removing a missing key is not an error.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        scope: Scope,
        entity: &str,
        attribute: &str,
    ) -> Result<bool, AttributeError> {
        let key = AttributeKey::new(scope, entity, attribute);
        let previous = self.data.write().await.remove(&key);
        let Some(previous) = previous else {
            return Ok(false);
        };

        if let Err(e) = self.persist().await {
            self.rollback(&key, Some(previous), None).await;
            return Err(e);
        }

        debug!("Deleted {}", key);
        Ok(true)
    }

    /// Write back a value read earlier, deleting the key if there was none.
    pub async fn restore(
        &self,
        scope: Scope,
        entity: &str,
        attribute: &str,
        previous: Option<&str>,
    ) -> Result<(), AttributeError> {
        match previous {
            Some(value) => self.set(scope, entity, attribute, value).await.map(|_| ()),
            None => self.delete(scope, entity, attribute).await.map(|_| ()),
        }
    }

    /// First stored value among `candidates`, else the attribute default.
    pub async fn resolve_effective(
        &self,
        attribute: &str,
        candidates: &[(Scope, &str)],
    ) -> Option<String> {
        {
            let data = self.data.read().await;
            for (scope, entity) in candidates {
                let key = AttributeKey::new(*scope, entity, attribute);
                if let Some(value) = data.get(&key) {
                    return Some(value.clone());
                }
            }
        }

        self.spec(attribute)
            .and_then(|s| s.default_value())
            .map(String::from)
    }

    /// Exclusive guard over one key for read-modify-write sequences.
    ///
    /// Plain `get`/`set` calls do not take this lock; callers that need
    /// "write, verify, revert" must hold it across the whole sequence.
    pub async fn lock(&self, scope: Scope, entity: &str, attribute: &str) -> OwnedMutexGuard<()> {
        let key = AttributeKey::new(scope, entity, attribute);
        let lock = self
            .key_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of stored values.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    async fn rollback(&self, key: &AttributeKey, previous: Option<String>, written: Option<&str>) {
        let mut data = self.data.write().await;
        // Leave the key alone if another writer got there first.
        if data.get(key).map(String::as_str) != written {
            return;
        }
        match previous {
            Some(value) => {
                data.insert(key.clone(), value);
            }
            None => {
                data.remove(key);
            }
        }
    }

    /// Write all records to the store file.
    async fn persist(&self) -> Result<(), AttributeError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;

        let file = {
            let data = self.data.read().await;
            let mut records: Vec<AttributeRecord> = data
                .iter()
                .map(|(key, value)| AttributeRecord {
                    scope: key.scope,
                    entity: key.entity.clone(),
                    attribute: key.attribute.clone(),
                    value: value.clone(),
                })
                .collect();
            records.sort_by(|a, b| {
                (a.scope, &a.entity, &a.attribute).cmp(&(b.scope, &b.entity, &b.attribute))
            });
            StoreFile {
                version: DATA_VERSION,
                records,
            }
        };
        let bytes = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved {} attributes to {:?}", file.records.len(), path);
        Ok(())
    }

    /// Load records from the store file, re-validating each one.
    async fn load(&self) -> Result<(), AttributeError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        if !path.exists() {
            info!("Attribute store not found at {:?}, starting fresh", path);
            return Ok(());
        }

        let bytes = fs::read(path).await?;
        let file: StoreFile = serde_json::from_slice(&bytes)?;

        let mut data = self.data.write().await;
        let mut rejected = 0usize;
        for record in file.records {
            let Some(spec) = self.specs.get(&record.attribute) else {
                rejected += 1;
                continue;
            };
            match spec.parse(&record.value) {
                Ok(value) => {
                    let key = AttributeKey::new(record.scope, &record.entity, &record.attribute);
                    data.insert(key, value);
                }
                Err(reason) => {
                    warn!(
                        attribute = %record.attribute,
                        entity = %record.entity,
                        "Dropping stored value that no longer validates: {}",
                        reason
                    );
                    rejected += 1;
                }
            }
        }

        if rejected > 0 {
            warn!("Skipped {} invalid or unknown records", rejected);
        }
        info!("Loaded attribute store: {} values", data.len());

        Ok(())
    }
}
