use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use chrono::Datelike;
use itertools::Itertools;
use log::{debug, info};
use rust_decimal::Decimal;

use crate::{
    cli::ReportArgs,
    commands::{Command, CommandOutput, CommandRegistry, ParamKind, ParamSpec, Params},
    data::{Value, clean_numeric, parse_lenient_datetime},
    error::{IngestError, IngestResult},
    io_utils,
    store::{self, StoreSnapshot},
    table,
};

pub const CARRIER_FIELD: &str = "Carrier_Name";
pub const EARNER_FIELD: &str = "Earner_Name";
pub const PLAN_FIELD: &str = "Plan_Name";
pub const AMOUNT_FIELD: &str = "Commission_Amount";
pub const PERIOD_FIELD: &str = "Commission_Period";
pub const EXPORT_FILE_NAME: &str = "exported_data.csv";

const K_PARAM: ParamSpec = ParamSpec::required("k", ParamKind::Int, "number of rows to keep");
const PERIOD_PARAM: ParamSpec =
    ParamSpec::required("period", ParamKind::Str, "commission month as YYYY-MM");
const PATH_PARAM: ParamSpec = ParamSpec::required(
    "path",
    ParamKind::Str,
    "destination file, or a directory to hold exported_data.csv",
);

pub fn builtin_commands() -> Vec<Box<dyn Command>> {
    vec![
        Box::new(ListCarriers),
        Box::new(TopKEarners),
        Box::new(TopKCarriers),
        Box::new(TopKPlans),
        Box::new(ExportCsv),
    ]
}

fn require_column<'a>(store: &'a StoreSnapshot, name: &str) -> IngestResult<Vec<&'a str>> {
    store.column(name).ok_or_else(|| {
        IngestError::Schema(format!("the store has no '{name}' column"))
    })
}

/// Parses a stored amount; `$`, thousands separators and `(x)` negatives
/// are accepted.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let (cleaned, negative) = clean_numeric(raw)?;
    if cleaned.is_empty() {
        return None;
    }
    let value = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -value } else { value })
}

/// `YYYY-MM` of a stored period value.
pub fn period_of(raw: &str) -> Option<String> {
    match parse_lenient_datetime(raw)? {
        Value::Date(d) => Some(format!("{:04}-{:02}", d.year(), d.month())),
        Value::DateTime(dt) => Some(format!("{:04}-{:02}", dt.year(), dt.month())),
        _ => None,
    }
}

fn validate_period(period: &str) -> IngestResult<String> {
    let canonical = period_of(period).filter(|p| p == period.trim());
    canonical.ok_or_else(|| {
        IngestError::Config(format!("period '{period}' must be written as YYYY-MM"))
    })
}

/// Groups rows by `group_field`, sums `Commission_Amount`, and keeps the
/// `k` largest totals. Ties go to the group name in ascending order.
pub fn top_k_by(
    store: &StoreSnapshot,
    group_field: &str,
    k: usize,
    period: Option<&str>,
) -> IngestResult<Vec<(String, Decimal)>> {
    let groups = require_column(store, group_field)?;
    let amounts = require_column(store, AMOUNT_FIELD)?;
    let periods = match period {
        Some(_) => Some(require_column(store, PERIOD_FIELD)?),
        None => None,
    };

    let mut totals: HashMap<&str, Decimal> = HashMap::new();
    let mut skipped = 0usize;
    for (idx, (group, amount)) in groups.iter().zip(&amounts).enumerate() {
        if let (Some(wanted), Some(periods)) = (period, &periods)
            && period_of(periods[idx]).as_deref() != Some(wanted)
        {
            continue;
        }
        let group = group.trim();
        if group.is_empty() {
            continue;
        }
        match parse_amount(amount) {
            Some(value) => *totals.entry(group).or_default() += value,
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        debug!("Skipped {skipped} row(s) without a usable {AMOUNT_FIELD}");
    }

    Ok(totals
        .into_iter()
        .map(|(name, total)| (name.to_string(), total.normalize()))
        .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
        .take(k)
        .collect())
}

fn ranked_output(group_header: &str, ranked: Vec<(String, Decimal)>) -> CommandOutput {
    let rows = ranked
        .into_iter()
        .map(|(name, total)| vec![name, total.to_string()])
        .collect();
    CommandOutput::table(&[group_header, "Total_Commission"], rows)
}

struct ListCarriers;

impl Command for ListCarriers {
    fn name(&self) -> &'static str {
        "list_carriers"
    }

    fn help(&self) -> &'static str {
        "List every carrier present in the store"
    }

    fn execute(&self, store: &StoreSnapshot, _params: &Params) -> IngestResult<CommandOutput> {
        let mut seen = HashSet::new();
        let rows = require_column(store, CARRIER_FIELD)?
            .into_iter()
            .map(str::trim)
            .filter(|c| !c.is_empty() && seen.insert(*c))
            .map(|c| vec![c.to_string()])
            .collect();
        Ok(CommandOutput::table(&[CARRIER_FIELD], rows))
    }
}

struct TopKEarners;

impl Command for TopKEarners {
    fn name(&self) -> &'static str {
        "top_k_earners"
    }

    fn help(&self) -> &'static str {
        "Highest-earning earners for one commission month"
    }

    fn parameters(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[K_PARAM, PERIOD_PARAM];
        PARAMS
    }

    fn execute(&self, store: &StoreSnapshot, params: &Params) -> IngestResult<CommandOutput> {
        let k = params.positive("k")?;
        let period = validate_period(params.str("period").unwrap_or_default())?;
        let ranked = top_k_by(store, EARNER_FIELD, k, Some(&period))?;
        Ok(ranked_output(EARNER_FIELD, ranked))
    }
}

struct TopKCarriers;

impl Command for TopKCarriers {
    fn name(&self) -> &'static str {
        "top_k_carriers"
    }

    fn help(&self) -> &'static str {
        "Carriers with the largest total commission"
    }

    fn parameters(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[K_PARAM];
        PARAMS
    }

    fn execute(&self, store: &StoreSnapshot, params: &Params) -> IngestResult<CommandOutput> {
        let ranked = top_k_by(store, CARRIER_FIELD, params.positive("k")?, None)?;
        Ok(ranked_output(CARRIER_FIELD, ranked))
    }
}

struct TopKPlans;

impl Command for TopKPlans {
    fn name(&self) -> &'static str {
        "top_k_plans"
    }

    fn help(&self) -> &'static str {
        "Plans with the largest total commission"
    }

    fn parameters(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[K_PARAM];
        PARAMS
    }

    fn execute(&self, store: &StoreSnapshot, params: &Params) -> IngestResult<CommandOutput> {
        let ranked = top_k_by(store, PLAN_FIELD, params.positive("k")?, None)?;
        Ok(ranked_output(PLAN_FIELD, ranked))
    }
}

struct ExportCsv;

impl ExportCsv {
    fn destination(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(EXPORT_FILE_NAME)
        } else {
            path.to_path_buf()
        }
    }
}

impl Command for ExportCsv {
    fn name(&self) -> &'static str {
        "export_csv"
    }

    fn help(&self) -> &'static str {
        "Write the normalized store to a CSV file"
    }

    fn parameters(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[PATH_PARAM];
        PARAMS
    }

    fn execute(&self, store: &StoreSnapshot, params: &Params) -> IngestResult<CommandOutput> {
        let raw = params.str("path").unwrap_or_default();
        if raw.is_empty() {
            return Err(IngestError::Config("export path cannot be empty".to_string()));
        }
        let target = Self::destination(Path::new(raw));
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, store.to_csv_bytes()?)?;
        info!("Exported {} row(s) to {target:?}", store.len());
        Ok(CommandOutput::message(format!(
            "Exported {} row(s) to {}",
            store.len(),
            target.display()
        )))
    }
}

pub fn execute(args: &ReportArgs) -> Result<()> {
    let registry = CommandRegistry::builtin();
    let snapshot = store::load_snapshot(&args.store)
        .with_context(|| format!("Loading store {:?}", args.store))?;
    info!(
        "Running '{}' over {} stored row(s)",
        args.command,
        snapshot.len()
    );
    let output = registry
        .run(&args.command, &snapshot, &args.params)
        .with_context(|| format!("Running report command '{}'", args.command))?;
    emit(&output, args.csv)
}

pub fn list_commands() -> Result<()> {
    let registry = CommandRegistry::builtin();
    emit(&registry.describe(), false)
}

fn emit(output: &CommandOutput, as_csv: bool) -> Result<()> {
    if let Some(message) = &output.message {
        println!("{message}");
    }
    if output.headers.is_empty() {
        return Ok(());
    }
    if as_csv {
        let mut writer = io_utils::stdout_csv_writer(b',');
        writer.write_record(&output.headers)?;
        for row in &output.rows {
            writer.write_record(row)?;
        }
        writer.flush().context("Flushing report output")?;
    } else {
        table::print_table(&output.headers, &output.rows);
    }
    Ok(())
}
