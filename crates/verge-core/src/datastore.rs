use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::stats::Stats;
use crate::task::Task;

/// A storage key and the schema version of the data written under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageKey {
    pub name: &'static str,
    pub schema_version: u32,
}

/// Current key plus older keys tried in order when it is empty.
#[derive(Debug, Clone, Copy)]
pub struct KeySet {
    pub primary: StorageKey,
    pub legacy: &'static [StorageKey],
}

pub const TASKS_KEYS: KeySet = KeySet {
    primary: StorageKey {
        name: "edf-scheduler-app-tasks-v4",
        schema_version: 4,
    },
    legacy: &[
        StorageKey {
            name: "edf-tasks-v3",
            schema_version: 3,
        },
        StorageKey {
            name: "edf-tasks-v2",
            schema_version: 2,
        },
        StorageKey {
            name: "edf-tasks",
            schema_version: 1,
        },
    ],
};

pub const STATS_KEYS: KeySet = KeySet {
    primary: StorageKey {
        name: "edf-scheduler-app-stats-v4",
        schema_version: 4,
    },
    legacy: &[
        StorageKey {
            name: "edf-stats-v3",
            schema_version: 3,
        },
        StorageKey {
            name: "edf-stats-v2",
            schema_version: 2,
        },
        StorageKey {
            name: "edf-stats",
            schema_version: 1,
        },
    ],
};

pub const LAST_CHECK_KEY: &str = "lastRolloverCheck";

/// Raw string storage addressed by key.
pub trait Backend {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    pub data_dir: PathBuf,
}

impl FileBackend {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|err| {
            Error::persistence(format!("failed to create {}: {err}", data_dir.display()))
        })?;
        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl Backend for FileBackend {
    #[tracing::instrument(skip(self))]
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|err| {
            Error::persistence(format!("failed reading {}: {err}", path.display()))
        })?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        debug!(file = %path.display(), bytes = raw.len(), "read key");
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn write(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        write_atomic(&path, value)
            .map_err(|err| Error::persistence(format!("failed to persist {}: {err:#}", path.display())))
    }
}

fn write_atomic(path: &Path, value: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = value.len(), "saving atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(value.as_bytes())?;
    temp.flush()?;
    temp.persist(path)?;
    Ok(())
}

/// Keeps keys in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RefCell<BTreeMap<String, String>>,
    read_only: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write fails, to exercise degraded-save handling.
    pub fn read_only() -> Self {
        Self {
            entries: RefCell::default(),
            read_only: true,
        }
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl Backend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key).filter(|raw| !raw.trim().is_empty()))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::persistence(format!("backend is read-only: {key}")));
        }
        self.insert(key, value);
        Ok(())
    }
}

/// Typed task/stats persistence over a [`Backend`], with legacy key
/// migration.
#[derive(Debug)]
pub struct DataStore<B> {
    backend: B,
}

impl<B: Backend> DataStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.load_migrating(&TASKS_KEYS)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        self.save_json(TASKS_KEYS.primary.name, tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_stats(&self) -> Result<Stats> {
        Ok(self.load_migrating(&STATS_KEYS)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self))]
    pub fn save_stats(&self, stats: &Stats) -> Result<()> {
        self.save_json(STATS_KEYS.primary.name, stats)
    }

    pub fn load_last_check(&self) -> Result<Option<NaiveDate>> {
        let Some(raw) = self.backend.read(LAST_CHECK_KEY)? else {
            return Ok(None);
        };
        decode(LAST_CHECK_KEY, &raw).map(Some)
    }

    pub fn save_last_check(&self, date: NaiveDate) -> Result<()> {
        self.save_json(LAST_CHECK_KEY, &date)
    }

    /// Reads the primary key, falling back to the first non-empty legacy key.
    /// A legacy hit is copied to the primary key straight away.
    fn load_migrating<T>(&self, keys: &KeySet) -> Result<Option<T>>
    where
        T: DeserializeOwned + Serialize,
    {
        if let Some(raw) = self.backend.read(keys.primary.name)? {
            return decode(keys.primary.name, &raw).map(Some);
        }

        for key in keys.legacy {
            let Some(raw) = self.backend.read(key.name)? else {
                continue;
            };
            info!(
                from = key.name,
                from_version = key.schema_version,
                to = keys.primary.name,
                to_version = keys.primary.schema_version,
                "migrating legacy key"
            );
            let value: T = decode(key.name, &raw)?;
            if let Err(err) = self.save_json(keys.primary.name, &value) {
                warn!(error = %err, "failed to persist migrated data; continuing");
            }
            return Ok(Some(value));
        }

        debug!(key = keys.primary.name, "no stored data");
        Ok(None)
    }

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|err| Error::persistence(format!("failed encoding {key}: {err}")))?;
        self.backend.write(key, &raw)
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|err| Error::persistence(format!("failed parsing {key}: {err}")))
}
