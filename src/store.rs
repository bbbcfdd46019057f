use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tempfile::Builder;
use tracing::debug;

use crate::domain::{CatalogId, OrbitRegime, OwnerId, RawElementSet, TrackedObject};
use crate::error::TleError;
use crate::tle::DerivedOrbitalParameters;

const LEDGER_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HistoryKey {
    pub catalog_id: CatalogId,
    pub epoch: DateTime<Utc>,
    pub owner_id: OwnerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub catalog_id: CatalogId,
    pub owner_id: OwnerId,
    pub epoch: DateTime<Utc>,
    pub elements: RawElementSet,
    pub derived: DerivedOrbitalParameters,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn key(&self) -> HistoryKey {
        HistoryKey {
            catalog_id: self.catalog_id,
            epoch: self.epoch,
            owner_id: self.owner_id.clone(),
        }
    }

    pub fn object(&self) -> TrackedObject {
        TrackedObject::new(self.catalog_id, self.owner_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub catalog_id: CatalogId,
    pub owner_id: OwnerId,
    pub epoch: DateTime<Utc>,
    pub elements: RawElementSet,
    pub derived: DerivedOrbitalParameters,
    pub regime: OrbitRegime,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_record(record: &HistoryRecord, updated_at: DateTime<Utc>) -> Self {
        Self {
            catalog_id: record.catalog_id,
            owner_id: record.owner_id.clone(),
            epoch: record.epoch,
            elements: record.elements.clone(),
            derived: record.derived,
            regime: record.derived.regime(),
            updated_at,
        }
    }

    pub fn object(&self) -> TrackedObject {
        TrackedObject::new(self.catalog_id, self.owner_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

// `insert_history` is insert-or-ignore on `(catalog_id, epoch, owner_id)`;
// `upsert_snapshot` is insert-or-update on `(catalog_id, owner_id)`.
pub trait ElementRepository: Send + Sync {
    fn tracked_objects(&self) -> Result<Vec<TrackedObject>, TleError>;

    fn track(&self, object: &TrackedObject) -> Result<bool, TleError>;

    fn insert_history(&self, record: &HistoryRecord) -> Result<InsertOutcome, TleError>;

    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), TleError>;

    fn snapshot(&self, object: &TrackedObject) -> Result<Option<Snapshot>, TleError>;

    fn history(&self, object: &TrackedObject) -> Result<Vec<HistoryRecord>, TleError>;
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    tracked: BTreeSet<TrackedObject>,
    history: BTreeMap<HistoryKey, HistoryRecord>,
    snapshots: BTreeMap<TrackedObject, Snapshot>,
}

impl Ledger {
    fn track(&mut self, object: &TrackedObject) -> bool {
        self.tracked.insert(object.clone())
    }

    fn insert_history(&mut self, record: &HistoryRecord) -> InsertOutcome {
        let key = record.key();
        if self.history.contains_key(&key) {
            return InsertOutcome::Duplicate;
        }
        self.history.insert(key, record.clone());
        InsertOutcome::Inserted
    }

    fn upsert_snapshot(&mut self, snapshot: &Snapshot) {
        self.snapshots.insert(snapshot.object(), snapshot.clone());
    }

    fn history(&self, object: &TrackedObject) -> Vec<HistoryRecord> {
        self.history
            .values()
            .filter(|record| {
                record.catalog_id == object.catalog_id && record.owner_id == object.owner_id
            })
            .cloned()
            .collect()
    }

    fn to_document(&self) -> LedgerDocument {
        LedgerDocument {
            schema_version: LEDGER_SCHEMA_VERSION,
            tracked: self.tracked.iter().cloned().collect(),
            history: self.history.values().cloned().collect(),
            snapshots: self.snapshots.values().cloned().collect(),
        }
    }

    fn from_document(document: LedgerDocument) -> Self {
        let mut ledger = Ledger::default();
        for object in document.tracked {
            ledger.track(&object);
        }
        for record in document.history {
            ledger.insert_history(&record);
        }
        for snapshot in document.snapshots {
            ledger.upsert_snapshot(&snapshot);
        }
        ledger
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerDocument {
    schema_version: u32,
    #[serde(default)]
    tracked: Vec<TrackedObject>,
    #[serde(default)]
    history: Vec<HistoryRecord>,
    #[serde(default)]
    snapshots: Vec<Snapshot>,
}

fn lock(ledger: &Mutex<Ledger>) -> Result<MutexGuard<'_, Ledger>, TleError> {
    ledger
        .lock()
        .map_err(|_| TleError::Store("ledger lock poisoned".to_string()))
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    ledger: Mutex<Ledger>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ElementRepository for MemoryRepository {
    fn tracked_objects(&self) -> Result<Vec<TrackedObject>, TleError> {
        Ok(lock(&self.ledger)?.tracked.iter().cloned().collect())
    }

    fn track(&self, object: &TrackedObject) -> Result<bool, TleError> {
        Ok(lock(&self.ledger)?.track(object))
    }

    fn insert_history(&self, record: &HistoryRecord) -> Result<InsertOutcome, TleError> {
        Ok(lock(&self.ledger)?.insert_history(record))
    }

    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), TleError> {
        lock(&self.ledger)?.upsert_snapshot(snapshot);
        Ok(())
    }

    fn snapshot(&self, object: &TrackedObject) -> Result<Option<Snapshot>, TleError> {
        Ok(lock(&self.ledger)?.snapshots.get(object).cloned())
    }

    fn history(&self, object: &TrackedObject) -> Result<Vec<HistoryRecord>, TleError> {
        Ok(lock(&self.ledger)?.history(object))
    }
}

#[derive(Debug)]
pub struct FileRepository {
    path: Utf8PathBuf,
    ledger: Mutex<Ledger>,
}

impl FileRepository {
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, TleError> {
        let path = path.into();
        let ledger = if path.as_std_path().exists() {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| TleError::Filesystem(format!("read {path}: {err}")))?;
            let document: LedgerDocument = serde_json::from_str(&content)
                .map_err(|err| TleError::Store(format!("parse {path}: {err}")))?;
            Ledger::from_document(document)
        } else {
            Ledger::default()
        };
        debug!(%path, "opened ledger");
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn default_path() -> Result<Utf8PathBuf, TleError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("tle-sync").join("ledger.json"))
                    .ok()
            })
            .ok_or_else(|| TleError::Filesystem("unable to resolve data directory".to_string()))
    }

    fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut Ledger) -> (T, bool),
    ) -> Result<T, TleError> {
        let mut guard = lock(&self.ledger)?;
        let mut next = guard.clone();
        let (value, changed) = mutate(&mut next);
        if changed {
            let content = serde_json::to_vec_pretty(&next.to_document())
                .map_err(|err| TleError::Store(err.to_string()))?;
            write_bytes_atomic(&self.path, &content)?;
            *guard = next;
        }
        Ok(value)
    }
}

impl ElementRepository for FileRepository {
    fn tracked_objects(&self) -> Result<Vec<TrackedObject>, TleError> {
        Ok(lock(&self.ledger)?.tracked.iter().cloned().collect())
    }

    fn track(&self, object: &TrackedObject) -> Result<bool, TleError> {
        self.commit(|ledger| {
            let added = ledger.track(object);
            (added, added)
        })
    }

    fn insert_history(&self, record: &HistoryRecord) -> Result<InsertOutcome, TleError> {
        self.commit(|ledger| {
            let outcome = ledger.insert_history(record);
            (outcome, outcome == InsertOutcome::Inserted)
        })
    }

    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<(), TleError> {
        self.commit(|ledger| {
            ledger.upsert_snapshot(snapshot);
            ((), true)
        })
    }

    fn snapshot(&self, object: &TrackedObject) -> Result<Option<Snapshot>, TleError> {
        Ok(lock(&self.ledger)?.snapshots.get(object).cloned())
    }

    fn history(&self, object: &TrackedObject) -> Result<Vec<HistoryRecord>, TleError> {
        Ok(lock(&self.ledger)?.history(object))
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TleError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| TleError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix("tle-sync-ledger")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| TleError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| TleError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| TleError::Filesystem(err.to_string()))?;
    Ok(())
}
