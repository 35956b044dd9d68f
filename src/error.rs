use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// Failures that abort an ingestion run before the store is touched.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("cannot merge columns into '{field}': source column(s) not found: {}", .missing.join(", "))]
    Mapping { field: String, missing: Vec<String> },
    #[error("no valid primary key: {0}")]
    Key(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("store {path:?} is corrupt: {reason}")]
    StoreCorruption { path: PathBuf, reason: String },
    #[error("store {path:?} is locked by another ingestion ({holder}); remove the lock file if that process is gone")]
    StoreLocked { path: PathBuf, holder: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// A column whose declared type could not be applied; the column keeps its
/// previous values for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionWarning {
    pub column: String,
    pub expected: String,
    pub reason: String,
}

impl fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to align column '{}' to {}: {}",
            self.column, self.expected, self.reason
        )
    }
}
