//! Named, read-only report commands over the persisted store.
//!
//! Commands are registered explicitly in [`CommandRegistry::builtin`]; each
//! one declares the parameters it accepts so the CLI can validate
//! `key=value` pairs before anything runs.

use std::{collections::BTreeMap, fmt};

use log::debug;

use crate::{
    error::{IngestError, IngestResult},
    store::StoreSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamKind::Int => "int",
            ParamKind::Str => "string",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub help: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind, help: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            help,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

/// Validated parameters for one command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: BTreeMap<String, ParamValue>,
}

impl Params {
    /// Parses `key=value` pairs against `specs`.
    pub fn parse(command: &str, specs: &[ParamSpec], raw: &[String]) -> IngestResult<Self> {
        let mut values = BTreeMap::new();
        for pair in raw {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                IngestError::Config(format!(
                    "parameter '{pair}' for '{command}' must be written as key=value"
                ))
            })?;
            let key = key.trim();
            let value = value.trim();
            let spec = specs.iter().find(|s| s.name == key).ok_or_else(|| {
                IngestError::Config(format!(
                    "'{command}' does not accept parameter '{key}' (expected: {})",
                    describe(specs)
                ))
            })?;
            let parsed = match spec.kind {
                ParamKind::Int => ParamValue::Int(value.parse::<i64>().map_err(|_| {
                    IngestError::Config(format!(
                        "parameter '{key}' for '{command}' must be an integer, got '{value}'"
                    ))
                })?),
                ParamKind::Str => ParamValue::Str(value.to_string()),
            };
            if values.insert(key.to_string(), parsed).is_some() {
                return Err(IngestError::Config(format!(
                    "parameter '{key}' given more than once"
                )));
            }
        }
        let missing = specs
            .iter()
            .filter(|s| s.required && !values.contains_key(s.name))
            .map(|s| s.name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(IngestError::Config(format!(
                "'{command}' is missing required parameter(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self { values })
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// A required positive count.
    pub fn positive(&self, name: &str) -> IngestResult<usize> {
        match self.int(name) {
            Some(v) if v > 0 => Ok(v as usize),
            Some(v) => Err(IngestError::Config(format!(
                "parameter '{name}' must be greater than 0, got {v}"
            ))),
            None => Err(IngestError::Config(format!("parameter '{name}' is required"))),
        }
    }
}

fn describe(specs: &[ParamSpec]) -> String {
    if specs.is_empty() {
        return "no parameters".to_string();
    }
    specs
        .iter()
        .map(|s| format!("{}:{}", s.name, s.kind))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tabular result of a command, optionally with a status message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub message: Option<String>,
}

impl CommandOutput {
    pub fn table(headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
            message: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

pub trait Command {
    fn name(&self) -> &'static str;
    fn help(&self) -> &'static str;
    fn parameters(&self) -> &[ParamSpec] {
        &[]
    }
    fn execute(&self, store: &StoreSnapshot, params: &Params) -> IngestResult<CommandOutput>;
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in report.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for command in crate::report::builtin_commands() {
            registry.register(command);
        }
        registry
    }

    pub fn register(&mut self, command: Box<dyn Command>) {
        debug!("Registering command '{}'", command.name());
        self.commands.insert(command.name(), command);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.commands.values().map(|c| c.as_ref())
    }

    /// Resolves `name`, validates `raw_params` and runs the command.
    pub fn run(
        &self,
        name: &str,
        store: &StoreSnapshot,
        raw_params: &[String],
    ) -> IngestResult<CommandOutput> {
        let command = self.get(name).ok_or_else(|| {
            IngestError::Config(format!(
                "unknown command '{name}'; available: {}",
                self.names().join(", ")
            ))
        })?;
        let params = Params::parse(name, command.parameters(), raw_params)?;
        command.execute(store, &params)
    }

    /// One row per command: name, parameters, help.
    pub fn describe(&self) -> CommandOutput {
        let rows = self
            .iter()
            .map(|c| {
                vec![
                    c.name().to_string(),
                    describe(c.parameters()),
                    c.help().to_string(),
                ]
            })
            .collect();
        CommandOutput::table(&["command", "parameters", "description"], rows)
    }
}
