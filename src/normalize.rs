use log::{debug, info};

use crate::{
    classify::EarnerClassifier,
    coerce::{align_date_columns, align_types},
    error::{CoercionWarning, IngestResult},
    key::derive_key,
    mapping::{MappingConfig, apply_mapping, resolve_field},
    record::RecordSet,
    schema::{EARNER_TYPE_FIELD, Schema},
};

/// Result of one normalization run, ready for the merge store.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub records: RecordSet,
    pub key_columns: Vec<String>,
    pub warnings: Vec<CoercionWarning>,
    pub duplicates_removed: usize,
}

/// Turns a raw source table into records of the canonical schema.
///
/// Stages run in a fixed order: date alignment of the raw columns, column
/// mapping, primary-key derivation, earner classification, type alignment,
/// then removal of exact duplicate rows.
pub struct Normalizer<'a> {
    schema: &'a Schema,
    classifier: &'a EarnerClassifier,
}

impl<'a> Normalizer<'a> {
    pub fn new(schema: &'a Schema, classifier: &'a EarnerClassifier) -> Self {
        Self { schema, classifier }
    }

    pub fn normalize(
        &self,
        mut raw: RecordSet,
        mapping: &MappingConfig,
    ) -> IngestResult<NormalizedBatch> {
        mapping.validate(self.schema)?;
        info!(
            "Normalizing {} row(s) across {} source column(s)",
            raw.len(),
            raw.headers().len()
        );

        let dated = align_date_columns(&mut raw);
        debug!("Date-aligned source columns: {dated:?}");

        let mut mapped = apply_mapping(&raw, self.schema, mapping)?;
        if !self.schema.contains(EARNER_TYPE_FIELD) {
            let earner_types =
                resolve_field(&raw, EARNER_TYPE_FIELD, mapping.source_for(EARNER_TYPE_FIELD))?;
            mapped.set_column(EARNER_TYPE_FIELD, earner_types)?;
        }

        let explicit_key = mapping.explicit_key();
        let (key_columns, keyed) = derive_key(mapped, self.schema, explicit_key.as_deref())?;

        let mut records = keyed.select(&self.schema.output_columns())?;
        if EarnerClassifier::needs_classification(&records) {
            self.classifier.classify(&mut records)?;
        } else {
            debug!("Source supplies '{EARNER_TYPE_FIELD}'; skipping fallback classification");
        }

        let warnings = align_types(&mut records, self.schema);
        let duplicates_removed = records.drop_duplicate_rows();
        if duplicates_removed > 0 {
            info!("Dropped {duplicates_removed} duplicate row(s)");
        }

        info!(
            "Normalized {} row(s) keyed on {key_columns:?}",
            records.len()
        );
        Ok(NormalizedBatch {
            records,
            key_columns,
            warnings,
            duplicates_removed,
        })
    }
}
