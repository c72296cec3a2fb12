//! Local persistent key-value slots.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// A string key-value store that survives restarts.
///
/// Implementations may refuse writes (quota, permissions); callers above
/// [`super::LocalCacheStore`] never see those errors.
pub trait LocalPersistentStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error.
    fn remove_string(&self, key: &str) -> Result<()>;

    /// List stored keys.
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    inner: Mutex<MemoryInner>,
    quota_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: BTreeMap<String, String>,
    writes: BTreeMap<String, usize>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once total stored bytes would exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            inner: Mutex::default(),
            quota_bytes: Some(bytes),
        }
    }

    /// Number of successful writes to `key` so far.
    pub fn write_count(&self, key: &str) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalPersistentStore for MemoryLocalStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        if let Some(quota) = self.quota_bytes {
            let others: usize = inner
                .values
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(Error::Storage(format!(
                    "quota of {quota} bytes exceeded writing {key}"
                )));
            }
        }
        inner.values.insert(key.to_string(), value.to_string());
        *inner.writes.entry(key.to_string()).or_default() += 1;
        Ok(())
    }

    fn remove_string(&self, key: &str) -> Result<()> {
        self.lock().values.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock().values.keys().cloned().collect())
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileLocalStore {
    dir: PathBuf,
}

const FILE_EXTENSION: &str = "json";

impl FileLocalStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{FILE_EXTENSION}", sanitize_key(key)))
    }
}

impl LocalPersistentStore for FileLocalStore {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, value)?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove_string(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Map a key onto a portable file name.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
