use log::{debug, info};

use crate::{
    data::{Value, key_token},
    error::{IngestError, IngestResult},
    record::RecordSet,
    schema::{PRIMARY_KEY_FIELD, Schema},
};

/// Chooses the key columns and writes the `Primary_Key` column.
///
/// An explicit key is used when it is non-empty and every named column exists
/// and carries data; an explicit key that fails those checks is rejected.
/// Without an explicit key, every schema field present in `mapped` (except
/// `Primary_Key` itself) contributes, in schema order.
pub fn derive_key(
    mut mapped: RecordSet,
    schema: &Schema,
    explicit_key: Option<&[String]>,
) -> IngestResult<(Vec<String>, RecordSet)> {
    let key_columns = match explicit_key {
        Some(columns) => validate_explicit_key(&mapped, columns)?,
        None => {
            let synthesized = schema
                .key_candidates()
                .filter(|field| mapped.has_column(field))
                .cloned()
                .collect::<Vec<_>>();
            if synthesized.is_empty() {
                return Err(IngestError::Key(
                    "no schema field is available to synthesize a primary key".to_string(),
                ));
            }
            debug!("Synthesized primary key from {synthesized:?}");
            synthesized
        }
    };

    let indices = key_columns
        .iter()
        .filter_map(|column| mapped.column_index(column))
        .collect::<Vec<_>>();
    let keys = mapped
        .rows()
        .iter()
        .map(|row| {
            let joined = indices
                .iter()
                .map(|idx| key_token(&row[*idx]))
                .collect::<Vec<_>>()
                .join(" ");
            Some(Value::String(joined.trim().to_string()))
        })
        .collect::<Vec<_>>();
    mapped.set_column(PRIMARY_KEY_FIELD, keys)?;
    info!(
        "Created '{PRIMARY_KEY_FIELD}' from {} column(s) for {} row(s)",
        key_columns.len(),
        mapped.len()
    );
    Ok((key_columns, mapped))
}

fn validate_explicit_key(mapped: &RecordSet, columns: &[String]) -> IngestResult<Vec<String>> {
    let columns = columns
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if columns.is_empty() {
        return Err(IngestError::Key(
            "explicit primary key lists no columns".to_string(),
        ));
    }
    if columns.iter().any(|c| c == PRIMARY_KEY_FIELD) {
        return Err(IngestError::Key(format!(
            "explicit primary key cannot reference '{PRIMARY_KEY_FIELD}' itself"
        )));
    }
    let missing = columns
        .iter()
        .filter(|c| !mapped.has_column(c))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(IngestError::Key(format!(
            "columns not found: {}",
            missing.join(", ")
        )));
    }
    if !mapped.is_empty() {
        let empty = columns
            .iter()
            .filter(|c| mapped.column_is_null(c))
            .cloned()
            .collect::<Vec<_>>();
        if !empty.is_empty() {
            return Err(IngestError::Key(format!(
                "key column(s) hold no values: {}",
                empty.join(", ")
            )));
        }
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, NULL_KEY_TOKEN};

    fn text(value: &str) -> Cell {
        Some(Value::String(value.to_string()))
    }

    fn mapped() -> (Schema, RecordSet) {
        let schema = Schema::new(
            vec![
                "Earner_Name".to_string(),
                "Plan_Name".to_string(),
                "Commission_Amount".to_string(),
            ],
            Vec::<(&str, &str)>::new(),
        )
        .unwrap();
        let set = RecordSet::from_rows(
            schema.fields().to_vec(),
            vec![
                vec![text("Jane Doe"), None, Some(Value::Float(100.0))],
                vec![None, None, None],
            ],
        )
        .unwrap();
        (schema, set)
    }

    #[test]
    fn synthesized_key_joins_fields_in_schema_order() {
        let (schema, set) = mapped();
        let (columns, keyed) = derive_key(set, &schema, None).unwrap();
        assert_eq!(columns, schema.fields());
        assert_eq!(
            keyed.cell(0, PRIMARY_KEY_FIELD),
            Some(&text(&format!("Jane Doe {NULL_KEY_TOKEN} 100")))
        );
        let all_null = format!("{NULL_KEY_TOKEN} {NULL_KEY_TOKEN} {NULL_KEY_TOKEN}");
        assert_eq!(keyed.cell(1, PRIMARY_KEY_FIELD), Some(&text(&all_null)));
    }

    #[test]
    fn explicit_key_is_honoured_when_valid() {
        let (schema, set) = mapped();
        let explicit = vec!["Earner_Name".to_string()];
        let (columns, keyed) = derive_key(set, &schema, Some(explicit.as_slice())).unwrap();
        assert_eq!(columns, explicit);
        assert_eq!(keyed.cell(0, PRIMARY_KEY_FIELD), Some(&text("Jane Doe")));
    }

    #[test]
    fn explicit_key_with_missing_column_is_rejected() {
        let (schema, set) = mapped();
        let explicit = vec!["Agent_ID".to_string()];
        let err = derive_key(set, &schema, Some(explicit.as_slice())).unwrap_err();
        assert!(matches!(err, IngestError::Key(ref msg) if msg.contains("Agent_ID")));
    }

    #[test]
    fn explicit_key_on_null_column_is_rejected() {
        let (schema, set) = mapped();
        let explicit = vec!["Plan_Name".to_string()];
        let err = derive_key(set, &schema, Some(explicit.as_slice())).unwrap_err();
        assert!(err.to_string().contains("Plan_Name"));
    }

    #[test]
    fn empty_explicit_key_is_rejected() {
        let (schema, set) = mapped();
        let err = derive_key(set, &schema, Some(&[][..])).unwrap_err();
        assert!(matches!(err, IngestError::Key(_)));
    }
}
