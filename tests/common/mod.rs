#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use commission_ingest::{
    data::parse_raw_cell, mapping::MappingConfig, record::RecordSet, schema::Schema,
};
use tempfile::{TempDir, tempdir};

pub const SCHEMA_YAML: &str = "\
fixed_schema:
  - Carrier_Name
  - Earner_Name
  - Plan_Name
  - Commission_Amount
  - Commission_Period
fixed_schema_data_types:
  Carrier_Name: string
  Earner_Name: string
  Plan_Name: string
  Commission_Amount: float
  Commission_Period: datetime
";

pub const MAPPING_YAML: &str = "\
mappings:
  Carrier_Name: Carrier
  Earner_Name:
    - Rep First
    - Rep Last
  Plan_Name: Plan
  Commission_Amount: Amount
  Commission_Period: Period
";

pub const EARNERS_YAML: &str = "\
earner_type_lookup:
  FMO:
    - brokerage
";

pub const JUNE_CSV: &str = "\
Rep First,Rep Last,Plan,Amount,Period
Jane,Doe,Gold,100,2024-06
Acme,Brokerage,Silver,\"1,250.00\",2024-06
Bob,Stone,Gold,75.5,2024-06
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes the standard schema, mapping and earner configs.
    pub fn write_configs(&self) -> Configs {
        Configs {
            schema: self.write("schema_config.yaml", SCHEMA_YAML),
            mapping: self.write("mapping.yaml", MAPPING_YAML),
            earners: self.write("earner_type_dict.yaml", EARNERS_YAML),
            store: self.path().join("database").join("normalized.csv"),
        }
    }
}

pub struct Configs {
    pub schema: PathBuf,
    pub mapping: PathBuf,
    pub earners: PathBuf,
    pub store: PathBuf,
}

pub fn schema() -> Schema {
    let dir = TestWorkspace::new();
    Schema::load(&dir.write("schema.yaml", SCHEMA_YAML)).expect("schema loads")
}

pub fn mapping() -> MappingConfig {
    let dir = TestWorkspace::new();
    MappingConfig::load(&dir.write("mapping.yaml", MAPPING_YAML)).expect("mapping loads")
}

/// Builds a raw record set from string cells, nulling placeholders.
pub fn raw_records(headers: &[&str], rows: &[&[&str]]) -> RecordSet {
    RecordSet::from_rows(
        headers.iter().map(|h| h.to_string()).collect(),
        rows.iter()
            .map(|row| row.iter().map(|v| parse_raw_cell(v)).collect())
            .collect(),
    )
    .expect("rectangular rows")
}
