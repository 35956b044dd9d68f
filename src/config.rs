use std::{fs::File, io::BufReader, path::Path};

use log::debug;
use serde::{Deserialize, de::DeserializeOwned};

use crate::error::{IngestError, IngestResult};

pub const DEFAULT_SCHEMA_PATH: &str = "config/schema_config.yaml";
pub const DEFAULT_EARNER_PATH: &str = "config/earner_type_dict.yaml";
pub const DEFAULT_STORE_PATH: &str = "database/normalized.csv";
pub const DEFAULT_EARNER_NAME_FIELD: &str = "Earner_Name";

/// Reads a YAML document, or JSON when the file carries a `.json` extension.
pub fn load_config_file<T: DeserializeOwned>(path: &Path) -> IngestResult<T> {
    let file = File::open(path).map_err(|err| {
        IngestError::Config(format!("cannot open config file {path:?}: {err}"))
    })?;
    let reader = BufReader::new(file);
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    debug!("Loading {} config from {path:?}", if is_json { "JSON" } else { "YAML" });
    if is_json {
        Ok(serde_json::from_reader(reader)?)
    } else {
        Ok(serde_yaml::from_reader(reader)?)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct EarnerTypeLookup {
    #[serde(rename = "FMO", alias = "fmo", default)]
    pub fmo: Vec<String>,
}

/// Name fragments that mark an earner as an FMO rather than an agent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EarnerConfig {
    #[serde(default)]
    pub earner_type_lookup: EarnerTypeLookup,
    #[serde(default = "EarnerConfig::default_name_field")]
    pub name_field: String,
}

impl EarnerConfig {
    fn default_name_field() -> String {
        DEFAULT_EARNER_NAME_FIELD.to_string()
    }

    pub fn load(path: &Path) -> IngestResult<Self> {
        load_config_file(path)
    }

    /// Loads the lookup if the file exists; a missing file means no fragments.
    pub fn load_optional(path: &Path) -> IngestResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No earner lookup at {path:?}; every earner defaults to Agent");
            Ok(Self::default())
        }
    }
}

impl Default for EarnerConfig {
    fn default() -> Self {
        Self {
            earner_type_lookup: EarnerTypeLookup::default(),
            name_field: Self::default_name_field(),
        }
    }
}
