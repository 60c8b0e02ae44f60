//! One-time copy of locally cached admin records into the backend.
//!
//! The admin screens used to keep stores, scenarios, staff and inventory in
//! a key-value cache. Each dataset is copied at most once: a flag in the
//! `migration_status` entry records completion, and rows are upserted by id
//! so a re-run after a partial failure never duplicates anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use mystery_cafe_core::{
    CafeError, CatalogRecord, InventoryItem, Scenario, StaffMember, StoreLocation,
};
use mystery_cafe_store::Store;

/// Cache key holding completion flags.
pub const STATUS_KEY: &str = "migration_status";

/// Errors raised by a local cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache file could not be read or written.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cache content is not valid JSON of the expected shape.
    #[error("cache format error: {0}")]
    Format(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

/// Key-value store the admin screens cached records in.
pub trait LocalCache: Send + Sync {
    /// Value under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: Value) -> Result<(), CacheError>;
}

/// In-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-filled with `entries`.
    #[must_use]
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: Mutex::new(entries.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

/// Cache persisted as a single JSON object file.
///
/// A missing file reads as empty. Writes go to a sibling temp file that is
/// then renamed over the original.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    /// Cache backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, CacheError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(CacheError::Format(format!(
                "{} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), CacheError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value);

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(entries))?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// A cached dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// Store locations.
    Stores,
    /// Scenarios.
    Scenarios,
    /// Staff members.
    Staff,
    /// Inventory items.
    Inventory,
}

impl Dataset {
    /// Every dataset, in the order `migrate_all` runs them.
    pub const ALL: [Self; 4] = [Self::Stores, Self::Scenarios, Self::Staff, Self::Inventory];

    /// Cache key holding the dataset.
    #[must_use]
    pub const fn cache_key(self) -> &'static str {
        match self {
            Self::Stores => "mystery_cafe_stores",
            Self::Scenarios => "mystery_cafe_scenarios",
            Self::Staff => "mystery_cafe_staff",
            Self::Inventory => "mystery_cafe_inventory",
        }
    }
}

/// Completion flags, stored under [`STATUS_KEY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationStatus {
    /// Staff copied.
    pub staff: bool,
    /// Scenarios copied.
    pub scenarios: bool,
    /// Stores copied.
    pub stores: bool,
    /// Inventory copied.
    pub inventory: bool,
}

impl MigrationStatus {
    /// Flag for `dataset`.
    #[must_use]
    pub const fn is_done(&self, dataset: Dataset) -> bool {
        match dataset {
            Dataset::Stores => self.stores,
            Dataset::Scenarios => self.scenarios,
            Dataset::Staff => self.staff,
            Dataset::Inventory => self.inventory,
        }
    }

    fn mark_done(&mut self, dataset: Dataset) {
        match dataset {
            Dataset::Stores => self.stores = true,
            Dataset::Scenarios => self.scenarios = true,
            Dataset::Staff => self.staff = true,
            Dataset::Inventory => self.inventory = true,
        }
    }

    /// Whether every dataset has been copied.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.staff && self.scenarios && self.stores && self.inventory
    }
}

/// Outcome of migrating one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Dataset migrated.
    pub dataset: Dataset,
    /// Already flagged as done; nothing was read.
    pub skipped: bool,
    /// Rows written.
    pub migrated: u64,
    /// Cached records that could not be parsed.
    pub rejected: usize,
}

/// Errors raised by the migrator.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The local cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The backend rejected the write.
    #[error(transparent)]
    Store(#[from] CafeError),
}

/// Decode a cached dataset. Cached values may be the array itself or a JSON
/// string containing it. Records that fail to parse are dropped.
fn parse_records<R: CatalogRecord>(
    dataset: Dataset,
    value: Value,
) -> Result<(Vec<R>, usize), CacheError> {
    let value = match value {
        Value::String(raw) => serde_json::from_str(&raw)?,
        other => other,
    };
    let Value::Array(items) = value else {
        return Err(CacheError::Format(format!(
            "{} is not an array",
            dataset.cache_key()
        )));
    };

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for (index, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<R>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                rejected += 1;
                tracing::warn!(?dataset, index, error = %e, "Skipping unreadable cached record");
            }
        }
    }

    // Last one wins when the cache holds the same id twice.
    let mut by_id: BTreeMap<String, R> = BTreeMap::new();
    for record in records {
        by_id.insert(record.id().to_string(), record);
    }
    Ok((by_id.into_values().collect(), rejected))
}

/// Copies cached datasets into backend tables.
pub struct Migrator {
    store: Arc<dyn Store>,
    cache: Arc<dyn LocalCache>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator").finish_non_exhaustive()
    }
}

impl Migrator {
    /// Migrator reading from `cache` and writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn LocalCache>) -> Self {
        Self { store, cache }
    }

    /// Current completion flags. An unreadable status entry reads as nothing
    /// migrated.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let Some(value) = self.cache.get(STATUS_KEY)? else {
            return Ok(MigrationStatus::default());
        };
        let value = match value {
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::Null),
            other => other,
        };
        Ok(serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Unreadable migration status, treating as not migrated");
            MigrationStatus::default()
        }))
    }

    /// Clear every completion flag.
    pub fn reset(&self) -> Result<(), MigrationError> {
        let cleared = serde_json::to_value(MigrationStatus::default())
            .map_err(CacheError::from)?;
        self.cache.set(STATUS_KEY, cleared)?;
        tracing::info!("Migration status reset");
        Ok(())
    }

    fn mark_done(&self, dataset: Dataset) -> Result<(), MigrationError> {
        let mut status = self.status()?;
        status.mark_done(dataset);
        let value = serde_json::to_value(status).map_err(CacheError::from)?;
        self.cache.set(STATUS_KEY, value)?;
        Ok(())
    }

    async fn migrate<R: CatalogRecord>(
        &self,
        dataset: Dataset,
    ) -> Result<MigrationReport, MigrationError> {
        if self.status()?.is_done(dataset) {
            tracing::debug!(?dataset, "Already migrated, skipping");
            return Ok(MigrationReport {
                dataset,
                skipped: true,
                migrated: 0,
                rejected: 0,
            });
        }

        let (records, rejected) = match self.cache.get(dataset.cache_key())? {
            Some(value) => parse_records::<R>(dataset, value)?,
            None => (Vec::new(), 0),
        };

        let rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(CacheError::from)?;

        let migrated = if rows.is_empty() {
            0
        } else {
            self.store
                .upsert_rows(R::TABLE, &rows)
                .await
                .map_err(CafeError::from)?
        };

        self.mark_done(dataset)?;
        tracing::info!(?dataset, migrated, rejected, "Dataset migrated");

        Ok(MigrationReport {
            dataset,
            skipped: false,
            migrated,
            rejected,
        })
    }

    /// Copy cached staff members.
    pub async fn migrate_staff(&self) -> Result<MigrationReport, MigrationError> {
        self.migrate::<StaffMember>(Dataset::Staff).await
    }

    /// Copy cached scenarios.
    pub async fn migrate_scenarios(&self) -> Result<MigrationReport, MigrationError> {
        self.migrate::<Scenario>(Dataset::Scenarios).await
    }

    /// Copy cached store locations.
    pub async fn migrate_stores(&self) -> Result<MigrationReport, MigrationError> {
        self.migrate::<StoreLocation>(Dataset::Stores).await
    }

    /// Copy cached inventory items.
    pub async fn migrate_inventory(&self) -> Result<MigrationReport, MigrationError> {
        self.migrate::<InventoryItem>(Dataset::Inventory).await
    }

    /// Copy every dataset, stopping at the first failure.
    pub async fn migrate_all(&self) -> Result<Vec<MigrationReport>, MigrationError> {
        let mut reports = Vec::with_capacity(Dataset::ALL.len());
        for dataset in Dataset::ALL {
            let report = match dataset {
                Dataset::Stores => self.migrate_stores().await?,
                Dataset::Scenarios => self.migrate_scenarios().await?,
                Dataset::Staff => self.migrate_staff().await?,
                Dataset::Inventory => self.migrate_inventory().await?,
            };
            reports.push(report);
        }
        Ok(reports)
    }
}
