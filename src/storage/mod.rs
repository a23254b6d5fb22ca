//! Key/value storage areas.
//!
//! Two areas mirror the extension's storage: a persisted local area
//! (`FileStore`) that survives restarts, and a session area (`MemoryStore`)
//! dropped on lock. Writers always replace whole values; there are no
//! field-level updates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{VaultError, VaultResult};

/// Storage keys, shared by both areas.
pub mod keys {
    pub const PASSWORD: &str = "@MyPepe_PASSWORD";
    pub const WALLET: &str = "@MyPepe_WALLET";
    pub const ONBOARDING_COMPLETE: &str = "@MyPepe_ONBOARDING_COMPLETE";
    pub const SELECTED_ADDRESS_INDEX: &str = "@MyPepe_SELECTED_ADDRESS_INDEX";
    pub const CONNECTED_CLIENTS: &str = "@MyPepe_CONNECTED_CLIENTS";
    pub const AUTHENTICATED: &str = "@MyPepe_AUTHENTICATED";
    pub const SPENT_OUTPOINTS: &str = "@MyPepe_SPENT_OUTPOINTS";
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<Value>>;
    /// Write several entries as one step.
    fn set_many(&self, entries: Vec<(String, Value)>) -> VaultResult<()>;
    fn remove(&self, keys: &[&str]) -> VaultResult<()>;
    fn clear(&self) -> VaultResult<()>;

    fn set(&self, key: &str, value: Value) -> VaultResult<()> {
        self.set_many(vec![(key.to_string(), value)])
    }
}

fn poisoned() -> VaultError {
    VaultError::Storage("store lock poisoned".into())
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> VaultResult<Option<Value>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> VaultResult<()> {
        let mut guard = self.entries.lock().map_err(|_| poisoned())?;
        guard.extend(entries);
        Ok(())
    }

    fn remove(&self, keys: &[&str]) -> VaultResult<()> {
        let mut guard = self.entries.lock().map_err(|_| poisoned())?;
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }

    fn clear(&self) -> VaultResult<()> {
        self.entries.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

/// JSON object file. Every write goes to a sibling temp file that is then
/// renamed into place; a crash leaves either the old or the new record.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> VaultResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| VaultError::Storage(format!("read {}: {e}", path.display())))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| VaultError::Storage(format!("parse {}: {e}", path.display())))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VaultError::Storage(format!("mkdir {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .map_err(|e| VaultError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| VaultError::Storage(format!("rename {}: {e}", self.path.display())))
    }

    /// Apply `change` to a copy, persist, then swap in memory.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, Value>)) -> VaultResult<()> {
        let mut guard = self.entries.lock().map_err(|_| poisoned())?;
        let mut next = guard.clone();
        change(&mut next);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> VaultResult<Option<Value>> {
        Ok(self.entries.lock().map_err(|_| poisoned())?.get(key).cloned())
    }

    fn set_many(&self, entries: Vec<(String, Value)>) -> VaultResult<()> {
        self.update(|map| map.extend(entries))
    }

    fn remove(&self, keys: &[&str]) -> VaultResult<()> {
        self.update(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }

    fn clear(&self) -> VaultResult<()> {
        self.update(|map| map.clear())
    }
}
