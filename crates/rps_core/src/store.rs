//! Durable key-value storage.
//!
//! [`KeyValueStore`] is the contract the tournament relies on: atomic single-key
//! writes that are durable before returning, plus multi-key batches that apply
//! completely or not at all. [`Vault`] implements it over an in-memory map that
//! is mirrored to a JSON file.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Internally synchronized record store. Callers never lock around it.
pub trait KeyValueStore<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Result<Option<V>, StoreError>;

    fn put(&self, key: K, value: V) -> Result<(), StoreError>;

    /// Deleting a missing key is not an error.
    fn delete(&self, key: &K) -> Result<(), StoreError>;

    fn exists(&self, key: &K) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Read-modify-write of one record under the store lock.
    ///
    /// Returns the updated record, or `None` if the key is absent.
    fn update(&self, key: &K, f: &mut dyn FnMut(&mut V)) -> Result<Option<V>, StoreError>;

    /// Write all items or none of them.
    fn batch_put(&self, items: Vec<(K, V)>) -> Result<(), StoreError>;

    /// Apply `f` to every listed record in one atomic write. Missing keys are skipped.
    fn batch_update(&self, keys: &[K], f: &mut dyn FnMut(&mut V)) -> Result<Vec<V>, StoreError>;

    /// Snapshot of every record, ordered by key.
    fn all(&self) -> Result<Vec<(K, V)>, StoreError>;

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.all()?.len())
    }
}

/// JSON file backed store.
///
/// Every write serializes the whole map to a temporary file and renames it
/// over the previous one, so a crash leaves either the old or the new state.
/// The in-memory map only changes after the file write succeeded.
#[derive(Debug)]
pub struct Vault<K, V> {
    path: Option<PathBuf>,
    data: RwLock<BTreeMap<K, V>>,
}

impl<K, V> Vault<K, V>
where
    K: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open (or create) the vault file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<K, V>>, StoreError> {
        self.data.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<K, V>>, StoreError> {
        self.data.write().map_err(|_| StoreError::Poisoned)
    }

    fn persist(&self, data: &BTreeMap<K, V>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Apply `change` to a copy, persist it, then swap it in.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut BTreeMap<K, V>) -> T,
    ) -> Result<T, StoreError> {
        let mut data = self.write()?;
        let mut next = data.clone();
        let out = change(&mut next);
        self.persist(&next)?;
        *data = next;
        Ok(out)
    }
}

impl<K, V> KeyValueStore<K, V> for Vault<K, V>
where
    K: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync,
    V: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> Result<(), StoreError> {
        self.commit(|data| {
            data.insert(key, value);
        })
    }

    fn delete(&self, key: &K) -> Result<(), StoreError> {
        if !self.read()?.contains_key(key) {
            return Ok(());
        }
        self.commit(|data| {
            data.remove(key);
        })
    }

    fn exists(&self, key: &K) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(key))
    }

    fn update(&self, key: &K, f: &mut dyn FnMut(&mut V)) -> Result<Option<V>, StoreError> {
        if !self.read()?.contains_key(key) {
            return Ok(None);
        }
        self.commit(|data| {
            data.get_mut(key).map(|value| {
                f(value);
                value.clone()
            })
        })
    }

    fn batch_put(&self, items: Vec<(K, V)>) -> Result<(), StoreError> {
        self.commit(|data| data.extend(items))
    }

    fn batch_update(&self, keys: &[K], f: &mut dyn FnMut(&mut V)) -> Result<Vec<V>, StoreError> {
        self.commit(|data| {
            keys.iter()
                .filter_map(|key| {
                    data.get_mut(key).map(|value| {
                        f(value);
                        value.clone()
                    })
                })
                .collect()
        })
    }

    fn all(&self) -> Result<Vec<(K, V)>, StoreError> {
        Ok(self
            .read()?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
