//! Per-source mapping config and the column mapper.
//!
//! A mapping config names, for each schema field, either one source column
//! (renamed into place) or a list of source columns (space-joined into one
//! field). Schema fields without a usable source become null columns; every
//! source column not referenced by the mapping is dropped.

use std::{collections::BTreeMap, path::Path};

use log::{debug, info, warn};
use serde::Deserialize;

use crate::{
    config::load_config_file,
    data::{Cell, Value},
    error::{IngestError, IngestResult},
    record::RecordSet,
    schema::{EARNER_TYPE_FIELD, PRIMARY_KEY_FIELD, Schema},
};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SourceColumns {
    Single(String),
    Merge(Vec<String>),
}

impl SourceColumns {
    pub fn names(&self) -> Vec<&str> {
        match self {
            SourceColumns::Single(name) => vec![name.as_str()],
            SourceColumns::Merge(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MappingConfig {
    #[serde(default)]
    pub mappings: BTreeMap<String, SourceColumns>,
    #[serde(default, rename = "Primary_Key", alias = "primary_key")]
    pub primary_key: Option<SourceColumns>,
}

impl MappingConfig {
    pub fn load(path: &Path) -> IngestResult<Self> {
        let config: MappingConfig = load_config_file(path)?;
        if config.mappings.is_empty() {
            return Err(IngestError::Config(format!(
                "mapping config {path:?} has no 'mappings' entries"
            )));
        }
        Ok(config)
    }

    /// Explicit key fields, if the config supplies any.
    pub fn explicit_key(&self) -> Option<Vec<String>> {
        self.primary_key
            .as_ref()
            .map(|cols| cols.names().into_iter().map(str::to_string).collect())
    }

    pub fn source_for(&self, field: &str) -> Option<&SourceColumns> {
        self.mappings.get(field)
    }

    /// Structural checks that must pass before any record is touched.
    pub fn validate(&self, schema: &Schema) -> IngestResult<()> {
        if self.mappings.is_empty() {
            return Err(IngestError::Config(
                "mapping config has no 'mappings' entries".to_string(),
            ));
        }
        for (field, source) in &self.mappings {
            if let SourceColumns::Merge(columns) = source
                && columns.is_empty()
            {
                return Err(IngestError::Config(format!(
                    "mapping for '{field}' is an empty column list"
                )));
            }
            if field == PRIMARY_KEY_FIELD {
                return Err(IngestError::Config(format!(
                    "'{PRIMARY_KEY_FIELD}' is derived and cannot be mapped from a source column"
                )));
            }
            if !schema.contains(field) && field != EARNER_TYPE_FIELD {
                warn!("Mapping entry '{field}' is not a schema field and will be ignored");
            }
        }
        Ok(())
    }
}

/// Maps `raw` onto the schema: one column per schema field, in schema order.
pub fn apply_mapping(
    raw: &RecordSet,
    schema: &Schema,
    mapping: &MappingConfig,
) -> IngestResult<RecordSet> {
    let mut mapped = RecordSet::with_row_count(raw.len());
    for field in schema.fields() {
        let values = resolve_field(raw, field, mapping.source_for(field))?;
        mapped.set_column(field, values)?;
    }
    let dropped = raw
        .headers()
        .iter()
        .filter(|h| !mapping.mappings.values().any(|src| src.names().contains(&h.as_str())))
        .count();
    debug!("Dropped {dropped} unmapped source column(s)");
    Ok(mapped)
}

/// Produces the values of `field` from its mapping entry.
pub fn resolve_field(
    raw: &RecordSet,
    field: &str,
    source: Option<&SourceColumns>,
) -> IngestResult<Vec<Cell>> {
    match source {
        None => {
            debug!("No mapping for '{field}'; filling with nulls");
            Ok(vec![None; raw.len()])
        }
        Some(SourceColumns::Single(column)) => match raw.column(column) {
            Some(values) => {
                info!("Mapped '{column}' to '{field}'");
                Ok(values.into_iter().cloned().collect())
            }
            None => {
                warn!("Column '{column}' not found in the data. Setting '{field}' to null");
                Ok(vec![None; raw.len()])
            }
        },
        Some(SourceColumns::Merge(columns)) => merge_columns(raw, field, columns),
    }
}

/// Space-joins the listed columns row by row. Null parts are skipped; a row
/// whose parts are all null stays null.
pub fn merge_columns(raw: &RecordSet, field: &str, columns: &[String]) -> IngestResult<Vec<Cell>> {
    let missing = columns
        .iter()
        .filter(|c| !raw.has_column(c))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(IngestError::Mapping {
            field: field.to_string(),
            missing,
        });
    }
    let parts = columns
        .iter()
        .filter_map(|c| raw.column(c))
        .collect::<Vec<_>>();
    let merged = (0..raw.len())
        .map(|row| {
            let joined = parts
                .iter()
                .filter_map(|column| column[row].as_ref())
                .map(|value| value.as_display().trim().to_string())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if joined.is_empty() {
                None
            } else {
                Some(Value::String(joined))
            }
        })
        .collect();
    info!("Merged {columns:?} into '{field}'");
    Ok(merged)
}
