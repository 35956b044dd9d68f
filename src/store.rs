//! The merge store: durable, deduplicated snapshot of every normalized record.
//!
//! The store is a flat CSV file with a header row. Each ingestion run is one
//! transaction:
//!
//! 1. [`MergeStore::open`] takes an exclusive lock file next to the store and
//!    loads the current snapshot (if any) into memory.
//! 2. [`MergeStore::merge_and_persist`] appends the incoming rows after the
//!    existing ones, keeps only the last row for each `Primary_Key`, and
//!    atomically replaces the store file with the result.
//! 3. Dropping the [`MergeStore`] releases the lock, on success or failure.
//!
//! Readers ([`load_snapshot`]) never lock: the writer swaps the file by
//! rename, so a reader sees either the old or the new snapshot.

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File, OpenOptions},
    io::{BufReader, ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::{
    error::{IngestError, IngestResult},
    io_utils,
    record::RecordSet,
    schema::PRIMARY_KEY_FIELD,
};

/// Text form of a record table as persisted on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl StoreSnapshot {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_records(records: &RecordSet) -> Self {
        Self {
            headers: records.headers().to_vec(),
            rows: records.rendered_rows(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of `name` for every row, or `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    pub fn keys(&self) -> Option<Vec<&str>> {
        self.column(PRIMARY_KEY_FIELD)
    }

    pub fn read(path: &Path) -> IngestResult<Self> {
        let file = File::open(path)?;
        let mut reader = io_utils::open_csv_reader(BufReader::new(file), b',');
        let headers = reader
            .headers()
            .map_err(|err| corruption(path, format!("unreadable header: {err}")))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record =
                record.map_err(|err| corruption(path, format!("row {}: {err}", idx + 2)))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    /// Serialized CSV bytes, header first. Identical snapshots always produce
    /// identical bytes.
    pub fn to_csv_bytes(&self) -> IngestResult<Vec<u8>> {
        let mut writer = io_utils::csv_writer(Vec::new(), b',');
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| IngestError::Io(err.into_error()))
    }

    pub fn digest(&self) -> IngestResult<String> {
        Ok(sha256_hex(&self.to_csv_bytes()?))
    }

    /// Re-orders every row onto `headers`; missing cells become empty.
    fn project(&self, headers: &[String]) -> Vec<Vec<String>> {
        let indices = headers
            .iter()
            .map(|name| self.column_index(name))
            .collect::<Vec<_>>();
        self.rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| {
                        idx.and_then(|i| row.get(i).cloned())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect()
    }
}

fn corruption(path: &Path, reason: impl Into<String>) -> IngestError {
    IngestError::StoreCorruption {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Loads the persisted store for read-only use.
pub fn load_snapshot(path: &Path) -> IngestResult<StoreSnapshot> {
    if !path.exists() {
        return Err(IngestError::Config(format!(
            "the store at {path:?} does not exist; ingest a file first"
        )));
    }
    StoreSnapshot::read(path)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub snapshot: StoreSnapshot,
    pub inserted: usize,
    pub updated: usize,
}

/// Upserts `incoming` into `existing`: rows are concatenated (incoming after
/// existing) and only the last row for each `Primary_Key` survives, at its
/// position in the concatenation.
pub fn merge_snapshots(
    existing: Option<&StoreSnapshot>,
    incoming: &StoreSnapshot,
    store_path: &Path,
) -> IngestResult<MergeResult> {
    let incoming_keys = incoming.keys().ok_or_else(|| {
        IngestError::Schema(format!(
            "normalized records have no '{PRIMARY_KEY_FIELD}' column; the merge cannot be keyed"
        ))
    })?;
    if let Some(row) = incoming_keys.iter().position(|k| k.trim().is_empty()) {
        return Err(IngestError::Schema(format!(
            "normalized row {} has an empty '{PRIMARY_KEY_FIELD}'",
            row + 1
        )));
    }

    let existing_keys: HashSet<&str> = match existing {
        Some(store) => {
            let keys = store.keys().ok_or_else(|| {
                corruption(
                    store_path,
                    format!("persisted store has no '{PRIMARY_KEY_FIELD}' column"),
                )
            })?;
            // Blank stored keys would collapse into one row on merge.
            if let Some(row) = keys.iter().position(|k| k.trim().is_empty()) {
                return Err(corruption(
                    store_path,
                    format!(
                        "stored row {} (line {}) has an empty '{PRIMARY_KEY_FIELD}'",
                        row + 1,
                        row + 2
                    ),
                ));
            }
            keys.into_iter().collect()
        }
        None => HashSet::new(),
    };

    let mut headers = existing.map(|s| s.headers.clone()).unwrap_or_default();
    for header in &incoming.headers {
        if !headers.contains(header) {
            headers.push(header.clone());
        }
    }

    let distinct_incoming = incoming_keys.iter().copied().collect::<HashSet<_>>();
    let updated = distinct_incoming
        .iter()
        .filter(|k| existing_keys.contains(*k))
        .count();
    let inserted = distinct_incoming.len() - updated;

    let mut combined = existing.map(|s| s.project(&headers)).unwrap_or_default();
    combined.extend(incoming.project(&headers));

    let key_idx = headers
        .iter()
        .position(|h| h == PRIMARY_KEY_FIELD)
        .ok_or_else(|| IngestError::Schema(format!("'{PRIMARY_KEY_FIELD}' lost during merge")))?;
    let mut last_seen: HashMap<&str, usize> = HashMap::with_capacity(combined.len());
    for (idx, row) in combined.iter().enumerate() {
        last_seen.insert(row[key_idx].as_str(), idx);
    }
    let keep = combined
        .iter()
        .enumerate()
        .map(|(idx, row)| last_seen.get(row[key_idx].as_str()) == Some(&idx))
        .collect::<Vec<_>>();
    let rows = combined
        .into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect::<Vec<_>>();

    Ok(MergeResult {
        snapshot: StoreSnapshot { headers, rows },
        inserted,
        updated,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub existing_rows: usize,
    pub incoming_rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub total_rows: usize,
    pub digest: String,
}

/// Exclusive lock on a store, held for the lifetime of a transaction.
#[derive(Debug)]
struct StoreLock {
    path: PathBuf,
    released: bool,
}

impl StoreLock {
    fn acquire(store_path: &Path) -> IngestResult<Self> {
        let path = lock_path(store_path);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown holder".to_string());
                return Err(IngestError::StoreLocked {
                    path: store_path.to_path_buf(),
                    holder,
                });
            }
            Err(err) => return Err(err.into()),
        };
        writeln!(
            file,
            "pid={} acquired_at={}",
            std::process::id(),
            Utc::now().to_rfc3339()
        )?;
        file.sync_all()?;
        debug!("Acquired store lock {path:?}");
        Ok(Self {
            path,
            released: false,
        })
    }

    fn release(&mut self) -> IngestResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("Failed to release store lock {:?}: {err}", self.path);
        }
    }
}

pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}

/// A single-writer transaction over the persisted store.
#[derive(Debug)]
pub struct MergeStore {
    path: PathBuf,
    existing: Option<StoreSnapshot>,
    lock: StoreLock,
}

impl MergeStore {
    pub fn open(path: &Path) -> IngestResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let lock = StoreLock::acquire(path)?;
        let existing = if path.exists() {
            let snapshot = StoreSnapshot::read(path)?;
            if snapshot.column_index(PRIMARY_KEY_FIELD).is_none() {
                return Err(corruption(
                    path,
                    format!("persisted store has no '{PRIMARY_KEY_FIELD}' column"),
                ));
            }
            info!("Loaded {} stored row(s) from {path:?}", snapshot.len());
            Some(snapshot)
        } else {
            info!("No store at {path:?}; it will be created");
            None
        };
        Ok(Self {
            path: path.to_path_buf(),
            existing,
            lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn existing(&self) -> Option<&StoreSnapshot> {
        self.existing.as_ref()
    }

    /// Merges `records` into the store and replaces the persisted file.
    /// Consumes the transaction; the lock is released before returning.
    pub fn merge_and_persist(
        mut self,
        records: &RecordSet,
        key_columns: &[String],
    ) -> IngestResult<MergeOutcome> {
        debug!("Merging batch keyed on {key_columns:?}");
        let incoming = StoreSnapshot::from_records(records);
        let merged = merge_snapshots(self.existing.as_ref(), &incoming, &self.path)?;
        let bytes = merged.snapshot.to_csv_bytes()?;
        self.commit(&bytes)?;
        // The store is already replaced; a stale lock must not fail the run.
        if let Err(err) = self.lock.release() {
            warn!("Failed to release store lock for {:?}: {err}", self.path);
        }

        let outcome = MergeOutcome {
            existing_rows: self.existing.as_ref().map_or(0, StoreSnapshot::len),
            incoming_rows: incoming.len(),
            inserted: merged.inserted,
            updated: merged.updated,
            total_rows: merged.snapshot.len(),
            digest: sha256_hex(&bytes),
        };
        info!(
            "Store {:?}: {} inserted, {} updated, {} total row(s)",
            self.path, outcome.inserted, outcome.updated, outcome.total_rows
        );
        Ok(outcome)
    }

    fn commit(&self, bytes: &[u8]) -> IngestResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|err| IngestError::Io(err.error))?;
        debug!("Wrote {} byte(s) to {:?}", bytes.len(), self.path);
        Ok(())
    }
}
