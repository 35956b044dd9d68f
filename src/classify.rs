use log::{debug, info};

use crate::{
    config::EarnerConfig,
    data::Value,
    error::IngestResult,
    record::RecordSet,
    schema::EARNER_TYPE_FIELD,
};

pub const AGENT: &str = "Agent";
pub const FMO: &str = "FMO";

/// Assigns `Earner_Type` by case-insensitive name-fragment matching.
#[derive(Debug, Clone)]
pub struct EarnerClassifier {
    fragments: Vec<String>,
    name_field: String,
}

impl EarnerClassifier {
    pub fn new<I, S>(fragments: I, name_field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fragments = fragments
            .into_iter()
            .map(|f| f.as_ref().trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();
        Self {
            fragments,
            name_field: name_field.into(),
        }
    }

    pub fn from_config(config: &EarnerConfig) -> Self {
        Self::new(&config.earner_type_lookup.fmo, config.name_field.clone())
    }

    pub fn name_field(&self) -> &str {
        &self.name_field
    }

    /// The classification is a fallback: it runs only when the batch carries
    /// no `Earner_Type` values of its own.
    pub fn needs_classification(records: &RecordSet) -> bool {
        records.column_is_null(EARNER_TYPE_FIELD)
    }

    /// Writes `Earner_Type` for every row and returns how many became FMO.
    pub fn classify(&self, records: &mut RecordSet) -> IngestResult<usize> {
        let names = match records.column(&self.name_field) {
            Some(values) => values
                .into_iter()
                .map(|cell| {
                    cell.as_ref()
                        .map(|v| v.as_display().trim().to_lowercase())
                        .unwrap_or_default()
                })
                .collect::<Vec<_>>(),
            None => {
                debug!(
                    "Name field '{}' absent; every earner classified as {AGENT}",
                    self.name_field
                );
                vec![String::new(); records.len()]
            }
        };

        let mut labels = vec![AGENT; names.len()];
        for fragment in &self.fragments {
            for (label, name) in labels.iter_mut().zip(&names) {
                if name.contains(fragment.as_str()) {
                    *label = FMO;
                }
            }
        }
        let fmo_count = labels.iter().filter(|l| **l == FMO).count();
        records.set_column(
            EARNER_TYPE_FIELD,
            labels
                .into_iter()
                .map(|l| Some(Value::String(l.to_string())))
                .collect(),
        )?;
        info!(
            "Classified {} earner row(s): {fmo_count} {FMO}, {} {AGENT}",
            records.len(),
            records.len() - fmo_count
        );
        Ok(fmo_count)
    }
}
