use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;

use crate::store::KeyByteValueStore;

type Entries = BTreeMap<String, Value>;

/// A `KeyByteValueStore` persisted as a single JSON object on disk.
///
/// Values must themselves be JSON so the file stays readable. Nothing is
/// cached: every read loads the file and every write is a read-modify-write
/// under an advisory lock on a `.lock` sibling, so several processes can
/// share one state file. Writes go through a temporary sibling and a rename,
/// so a crash leaves either the old or the new content.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            lock_path: sibling(&path, ".lock"),
            path,
        };
        let entries = store.locked(false, || store.load())?;
        if entries.is_empty() {
            log::info!("no state in {}, starting empty", store.path.display());
        }
        Ok(store)
    }

    fn locked<T>(&self, exclusive: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("cannot open {}", self.lock_path.display()))?;
        let locking = if exclusive {
            FileExt::lock_exclusive(&lock)
        } else {
            FileExt::lock_shared(&lock)
        };
        locking.with_context(|| format!("cannot lock {}", self.lock_path.display()))?;

        let result = f();
        if let Err(e) = FileExt::unlock(&lock) {
            log::warn!("cannot unlock {}: {e}", self.lock_path.display());
        }
        result
    }

    fn load(&self) -> Result<Entries> {
        match fs::read(&self.path) {
            Ok(raw) => serde_json::from_slice(&raw)
                .with_context(|| format!("state file {} is corrupt", self.path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", self.path.display())),
        }
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let tmp = sibling(&self.path, ".tmp");
        let raw = serde_json::to_vec_pretty(entries)?;
        fs::write(&tmp, raw).with_context(|| format!("cannot write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }

    /// Loads, changes and saves the entries while holding the exclusive lock.
    /// `change` returns whether anything needs saving.
    fn update<T>(&self, change: impl FnOnce(&mut Entries) -> Result<(T, bool)>) -> Result<T> {
        self.locked(true, || {
            let mut entries = self.load()?;
            let (result, changed) = change(&mut entries)?;
            if changed {
                self.save(&entries)?;
            }
            Ok(result)
        })
    }
}

fn parse_value(key: &str, value: &[u8]) -> Result<Value> {
    serde_json::from_slice(value).with_context(|| format!("value for {key} is not JSON"))
}

impl KeyByteValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.locked(false, || self.load())?;
        entries
            .get(key)
            .map(|v| serde_json::to_vec(v).map_err(Into::into))
            .transpose()
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        let value = parse_value(key, &value)?;
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            Ok(((), true))
        })
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.update(|entries| Ok(((), entries.remove(key).is_some())))
    }

    fn set_if(&mut self, key: &str, expected: Option<&[u8]>, value: Vec<u8>) -> Result<bool> {
        let value = parse_value(key, &value)?;
        let expected = expected.map(|raw| parse_value(key, raw)).transpose()?;
        self.update(|entries| {
            if entries.get(key) != expected.as_ref() {
                return Ok((false, false));
            }
            entries.insert(key.to_string(), value);
            Ok((true, true))
        })
    }
}
