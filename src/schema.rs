//! Schema registry: the fixed canonical field list and declared field types.
//!
//! The registry is loaded once per run from `fixed_schema` (ordered field
//! names) and `fixed_schema_data_types` (type tag per column). It is
//! immutable after construction and defines the column order of every
//! normalized output. Unknown type tags are configuration errors.

use std::{collections::BTreeMap, fmt, path::Path, str::FromStr};

use log::{debug, warn};
use serde::Deserialize;

use crate::{
    config::load_config_file,
    error::{IngestError, IngestResult},
};

pub const PRIMARY_KEY_FIELD: &str = "Primary_Key";
pub const EARNER_TYPE_FIELD: &str = "Earner_Type";

/// Fields the reporting commands group and sum on.
pub const REPORT_FIELDS: &[&str] = &[
    "Carrier_Name",
    "Earner_Name",
    "Plan_Name",
    "Commission_Amount",
    "Commission_Period",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int,
    Float,
    DateTime,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::DateTime => "datetime",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "int", "float", "datetime"]
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" => Ok(FieldType::String),
            "int" | "integer" | "int64" => Ok(FieldType::Int),
            "float" | "float64" | "double" => Ok(FieldType::Float),
            "datetime" | "date" | "datetime64" | "timestamp" => Ok(FieldType::DateTime),
            _ => Err(IngestError::Config(format!(
                "unknown field type '{value}'; supported types: {}",
                FieldType::variants().join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaConfig {
    #[serde(default)]
    fixed_schema: Vec<String>,
    #[serde(default)]
    fixed_schema_data_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    types: Vec<(String, FieldType)>,
}

impl Schema {
    /// Builds a registry from field names and `(column, type tag)` pairs.
    pub fn new<I, S>(fields: Vec<String>, types: I) -> IngestResult<Self>
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        if fields.is_empty() {
            return Err(IngestError::Config(
                "fixed_schema must list at least one field".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &fields {
            if field.trim().is_empty() {
                return Err(IngestError::Config(
                    "fixed_schema contains an empty field name".to_string(),
                ));
            }
            if !seen.insert(field.as_str()) {
                return Err(IngestError::Config(format!(
                    "fixed_schema lists '{field}' more than once"
                )));
            }
        }

        let mut declared = Vec::new();
        for (column, tag) in types {
            let column = column.as_ref().to_string();
            let field_type = tag.as_ref().parse::<FieldType>().map_err(|err| match err {
                IngestError::Config(msg) => {
                    IngestError::Config(format!("column '{column}': {msg}"))
                }
                other => other,
            })?;
            declared.push((column, field_type));
        }
        // Schema order first, then extra typed columns by name.
        declared.sort_by_key(|(column, _)| {
            (
                fields.iter().position(|f| f == column).unwrap_or(usize::MAX),
                column.clone(),
            )
        });

        for (column, _) in &declared {
            if !fields.contains(column)
                && column != PRIMARY_KEY_FIELD
                && column != EARNER_TYPE_FIELD
            {
                debug!("Type declared for '{column}', which is not a fixed schema field");
            }
        }

        Ok(Self {
            fields,
            types: declared,
        })
    }

    pub fn load(path: &Path) -> IngestResult<Self> {
        let config: SchemaConfig = load_config_file(path)?;
        let schema = Self::new(config.fixed_schema, config.fixed_schema_data_types)?;
        let missing = schema.missing_report_fields();
        if !missing.is_empty() {
            warn!(
                "Schema {path:?} lacks report field(s) {}; those reports will be empty",
                missing.join(", ")
            );
        }
        Ok(schema)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.types
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, ty)| *ty)
    }

    /// Declared `(column, type)` pairs in schema order.
    pub fn typed_columns(&self) -> &[(String, FieldType)] {
        &self.types
    }

    /// Schema fields that feed key synthesis, in schema order.
    pub fn key_candidates(&self) -> impl Iterator<Item = &String> {
        self.fields.iter().filter(|f| *f != PRIMARY_KEY_FIELD)
    }

    /// Column order of every normalized record and of the persisted store.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.fields.clone();
        for extra in [PRIMARY_KEY_FIELD, EARNER_TYPE_FIELD] {
            if !self.contains(extra) {
                columns.push(extra.to_string());
            }
        }
        columns
    }

    pub fn missing_report_fields(&self) -> Vec<&'static str> {
        REPORT_FIELDS
            .iter()
            .copied()
            .filter(|field| !self.contains(field))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn field_type_accepts_aliases_and_rejects_unknown_tags() {
        assert_eq!("str".parse::<FieldType>().unwrap(), FieldType::String);
        assert_eq!("Integer".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!("float64".parse::<FieldType>().unwrap(), FieldType::Float);
        assert_eq!("date".parse::<FieldType>().unwrap(), FieldType::DateTime);
        let err = "money".parse::<FieldType>().unwrap_err();
        assert!(matches!(err, IngestError::Config(ref msg) if msg.contains("money")));
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let err = Schema::new(fields(&["A", "B", "A"]), Vec::<(&str, &str)>::new()).unwrap_err();
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn unknown_type_names_the_column() {
        let err = Schema::new(fields(&["Amount"]), vec![("Amount", "decimal")]).unwrap_err();
        assert!(err.to_string().contains("Amount"));
    }

    #[test]
    fn output_columns_append_key_and_earner_type() {
        let schema = Schema::new(
            fields(&["Earner_Name", "Commission_Amount"]),
            vec![("Commission_Amount", "float")],
        )
        .unwrap();
        assert_eq!(
            schema.output_columns(),
            fields(&["Earner_Name", "Commission_Amount", "Primary_Key", "Earner_Type"])
        );

        let listed = Schema::new(
            fields(&["Primary_Key", "Earner_Name", "Earner_Type"]),
            Vec::<(&str, &str)>::new(),
        )
        .unwrap();
        assert_eq!(
            listed.output_columns(),
            fields(&["Primary_Key", "Earner_Name", "Earner_Type"])
        );
        assert_eq!(listed.key_candidates().count(), 2);
    }

    #[test]
    fn typed_columns_follow_schema_order() {
        let schema = Schema::new(
            fields(&["B", "A"]),
            vec![("A", "int"), ("Earner_Type", "string"), ("B", "float")],
        )
        .unwrap();
        let order = schema
            .typed_columns()
            .iter()
            .map(|(c, _)| c.as_str())
            .collect::<Vec<_>>();
        assert_eq!(order, vec!["B", "A", "Earner_Type"]);
    }

    #[test]
    fn load_reads_yaml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            "fixed_schema:\n  - Earner_Name\n  - Commission_Amount\nfixed_schema_data_types:\n  Commission_Amount: float\n",
        )
        .unwrap();
        let schema = Schema::load(&path).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(
            schema.field_type("Commission_Amount"),
            Some(FieldType::Float)
        );
        assert_eq!(schema.field_type("Earner_Name"), None);
    }
}
