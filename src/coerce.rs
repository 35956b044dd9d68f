//! Type alignment for normalized records.
//!
//! Two passes run over a record set:
//!
//! - [`align_date_columns`] date-parses every column whose name mentions a
//!   date or period, whether or not it is a schema field.
//! - [`align_types`] converts each column with a declared [`FieldType`].
//!
//! Date parsing is per cell: a value that does not parse becomes null.
//! Numeric and string casts are per column: one bad value leaves the whole
//! column unconverted and yields a [`CoercionWarning`] instead of an error.

use log::{debug, info, warn};

use crate::{
    data::{Cell, Value, cast_float, cast_integer, to_datetime},
    error::CoercionWarning,
    record::RecordSet,
    schema::{FieldType, PRIMARY_KEY_FIELD, Schema},
};

const DATE_NAME_HINTS: &[&str] = &["date", "period"];

pub fn is_date_like_column(name: &str) -> bool {
    let lowered = name.to_lowercase();
    DATE_NAME_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Date-parses textual or numeric columns named like dates. Returns the names
/// of the converted columns.
pub fn align_date_columns(records: &mut RecordSet) -> Vec<String> {
    let candidates = records
        .headers()
        .iter()
        .filter(|name| is_date_like_column(name))
        .cloned()
        .collect::<Vec<_>>();
    let mut converted = Vec::new();
    for name in candidates {
        let eligible = records.column(&name).is_some_and(|values| {
            values
                .into_iter()
                .flatten()
                .all(Value::is_textual_or_numeric)
        });
        if !eligible {
            debug!("Column '{name}' already holds temporal values; skipping");
            continue;
        }
        let mut nulled = 0usize;
        if let Some(values) = records.column_values_mut(&name) {
            for cell in values {
                if let Some(value) = cell.take() {
                    *cell = to_datetime(&value);
                    if cell.is_none() {
                        nulled += 1;
                    }
                }
            }
        }
        if nulled > 0 {
            warn!("Column '{name}': {nulled} value(s) could not be parsed as dates and were nulled");
        }
        info!("Column '{name}' successfully converted to datetime.");
        converted.push(name);
    }
    converted
}

/// Converts every declared column present in `records` to its type.
pub fn align_types(records: &mut RecordSet, schema: &Schema) -> Vec<CoercionWarning> {
    let mut warnings = Vec::new();
    for (column, field_type) in schema.typed_columns() {
        // The key is always compared as text by the merge store.
        if column == PRIMARY_KEY_FIELD {
            if *field_type != FieldType::String {
                debug!("Ignoring declared {field_type} type for '{PRIMARY_KEY_FIELD}'");
            }
            continue;
        }
        let Some(values) = records.column(column) else {
            continue;
        };
        match convert_column(&values, *field_type) {
            Ok(converted) => {
                if let Err(err) = records.set_column(column, converted) {
                    warnings.push(warning(column, *field_type, err.to_string()));
                    continue;
                }
                info!("Column '{column}' successfully converted to {field_type}.");
            }
            Err(reason) => warnings.push(warning(column, *field_type, reason)),
        }
    }
    for item in &warnings {
        warn!("{item}");
    }
    warnings
}

fn warning(column: &str, field_type: FieldType, reason: String) -> CoercionWarning {
    CoercionWarning {
        column: column.to_string(),
        expected: field_type.to_string(),
        reason,
    }
}

/// Converts a column; nulls stay null under every type.
pub fn convert_column(values: &[&Cell], field_type: FieldType) -> Result<Vec<Cell>, String> {
    values
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            let Some(value) = cell else {
                return Ok(None);
            };
            let converted = match field_type {
                FieldType::DateTime => to_datetime(value),
                FieldType::String => Some(Value::String(value.as_display())),
                FieldType::Int => Some(Value::Integer(
                    cast_integer(value).map_err(|e| format!("row {}: {e}", row + 1))?,
                )),
                FieldType::Float => Some(Value::Float(
                    cast_float(value).map_err(|e| format!("row {}: {e}", row + 1))?,
                )),
            };
            Ok(converted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_raw_cell;
    use chrono::NaiveDate;

    fn records(headers: &[&str], rows: &[&[&str]]) -> RecordSet {
        RecordSet::from_rows(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|v| parse_raw_cell(v)).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn date_named_columns_are_parsed_leniently() {
        let mut set = records(
            &["Commission_Period", "Agent_Name", "Policy_Effective_Date"],
            &[
                &["2024-06", "John Doe", "2024-05-01"],
                &["2024-05", "Alice Smith", "2023-06-15"],
                &["not_a_date", "Bob Johnson", "2022-07-20"],
            ],
        );
        let converted = align_date_columns(&mut set);
        assert_eq!(converted, vec!["Commission_Period", "Policy_Effective_Date"]);
        assert_eq!(
            set.cell(0, "Commission_Period"),
            Some(&Some(Value::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())))
        );
        assert_eq!(set.cell(2, "Commission_Period"), Some(&None));
        assert_eq!(
            set.cell(0, "Agent_Name"),
            Some(&Some(Value::String("John Doe".into())))
        );
    }

    #[test]
    fn failed_numeric_cast_leaves_column_unconverted() {
        let schema = Schema::new(
            vec!["Commission_Amount".to_string(), "Member_Count".to_string()],
            vec![("Commission_Amount", "float"), ("Member_Count", "int")],
        )
        .unwrap();
        let mut set = records(
            &["Commission_Amount", "Member_Count"],
            &[&["100.50", "3"], &["$75", "many"]],
        );
        let warnings = align_types(&mut set, &schema);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].column, "Member_Count");
        assert!(warnings[0].reason.contains("row 2"));
        assert_eq!(set.cell(1, "Commission_Amount"), Some(&Some(Value::Float(75.0))));
        assert_eq!(
            set.cell(0, "Member_Count"),
            Some(&Some(Value::String("3".into())))
        );
    }

    #[test]
    fn declared_datetime_nulls_bad_values_without_warning() {
        let schema = Schema::new(
            vec!["Paid_On".to_string()],
            vec![("Paid_On", "datetime")],
        )
        .unwrap();
        let mut set = records(&["Paid_On"], &[&["06/15/2024"], &["soon"]]);
        let warnings = align_types(&mut set, &schema);
        assert!(warnings.is_empty());
        assert!(matches!(set.cell(0, "Paid_On"), Some(Some(Value::Date(_)))));
        assert_eq!(set.cell(1, "Paid_On"), Some(&None));
    }

    #[test]
    fn overflowing_bracketed_integer_warns_instead_of_aborting() {
        let schema = Schema::new(
            vec!["Member_Count".to_string()],
            vec![("Member_Count", "int")],
        )
        .unwrap();
        let mut set = records(&["Member_Count"], &[&["(5)"], &["(-9223372036854775808)"]]);
        let warnings = align_types(&mut set, &schema);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].reason.contains("row 2"));
        assert_eq!(
            set.cell(0, "Member_Count"),
            Some(&Some(Value::String("(5)".into())))
        );
    }

    #[test]
    fn string_cast_renders_typed_values() {
        let values = [Some(Value::Integer(7)), None];
        let refs = values.iter().collect::<Vec<_>>();
        let converted = convert_column(&refs, FieldType::String).unwrap();
        assert_eq!(converted, vec![Some(Value::String("7".into())), None]);
    }
}
