mod common;

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

use common::{Configs, JUNE_CSV, TestWorkspace};

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("commission-ingest").expect("binary exists");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn ingest(configs: &Configs, input: &Path) -> Command {
    let mut cmd = bin();
    cmd.args([
        "ingest",
        "-i",
        input.to_str().unwrap(),
        "-c",
        configs.mapping.to_str().unwrap(),
        "--schema",
        configs.schema.to_str().unwrap(),
        "--earners",
        configs.earners.to_str().unwrap(),
        "--store",
        configs.store.to_str().unwrap(),
    ]);
    cmd
}

fn report(configs: &Configs, args: &[&str]) -> Command {
    let mut cmd = bin();
    cmd.arg("report")
        .args(args)
        .args(["--store", configs.store.to_str().unwrap()]);
    cmd
}

#[test]
fn ingest_creates_store_with_tagged_carrier() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("Emblem June%202024.csv", JUNE_CSV);

    ingest(&configs, &input)
        .assert()
        .success()
        .stderr(contains("3 inserted"));

    let contents = fs::read_to_string(&configs.store).expect("store written");
    let header = contents.lines().next().expect("header line");
    assert_eq!(
        header,
        "\"Carrier_Name\",\"Earner_Name\",\"Plan_Name\",\"Commission_Amount\",\"Commission_Period\",\"Primary_Key\",\"Earner_Type\""
    );
    assert!(contents.contains("\"emblem_june\",\"Acme Brokerage\",\"Silver\",\"1250\",\"2024-06-01\""));
    assert!(contents.contains("\"FMO\""));

    report(&configs, &["list_carriers"])
        .assert()
        .success()
        .stdout(contains("emblem_june"));
}

#[test]
fn second_ingest_of_same_file_updates_in_place() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("emblem.csv", JUNE_CSV);

    ingest(&configs, &input).assert().success();
    let first = fs::read(&configs.store).expect("store");
    ingest(&configs, &input)
        .assert()
        .success()
        .stderr(contains("0 inserted, 3 updated, 3 total"));
    assert_eq!(first, fs::read(&configs.store).expect("store"));
}

#[test]
fn dry_run_previews_without_writing() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("emblem.csv", JUNE_CSV);

    ingest(&configs, &input)
        .args(["--dry-run", "--preview", "2"])
        .assert()
        .success()
        .stdout(contains("Earner_Name").and(contains("Jane Doe")))
        .stdout(contains("Bob Stone").not());
    assert!(!configs.store.exists());
}

#[test]
fn missing_merge_column_aborts_before_store_is_touched() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write(
        "emblem.csv",
        "Rep First,Plan,Amount,Period\nJane,Gold,100,2024-06\n",
    );

    ingest(&configs, &input)
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("Rep Last")));
    assert!(!configs.store.exists());
}

#[test]
fn missing_mapping_config_is_reported() {
    let workspace = TestWorkspace::new();
    let mut configs = workspace.write_configs();
    configs.mapping = workspace.path().join("absent.yaml");
    let input = workspace.write("emblem.csv", JUNE_CSV);

    ingest(&configs, &input)
        .assert()
        .failure()
        .stderr(contains("absent.yaml"));
}

#[test]
fn top_k_earners_emits_csv_ranking() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("emblem.csv", JUNE_CSV);
    ingest(&configs, &input).assert().success();

    report(
        &configs,
        &["top_k_earners", "-p", "k=2", "-p", "period=2024-06", "--csv"],
    )
    .assert()
    .success()
    .stdout(
        "\"Earner_Name\",\"Total_Commission\"\n\"Acme Brokerage\",\"1250\"\n\"Jane Doe\",\"100\"\n",
    );
}

#[test]
fn report_parameters_are_validated() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("emblem.csv", JUNE_CSV);
    ingest(&configs, &input).assert().success();

    report(&configs, &["top_k_plans", "-p", "k=0"])
        .assert()
        .failure()
        .stderr(contains("greater than 0"));
    report(&configs, &["top_k_plans"])
        .assert()
        .failure()
        .stderr(contains("missing required parameter"));
    report(&configs, &["sql_query", "-p", "query=select 1"])
        .assert()
        .failure()
        .stderr(contains("unknown command"));
}

#[test]
fn export_csv_writes_into_directory() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    let input = workspace.write("emblem.csv", JUNE_CSV);
    ingest(&configs, &input).assert().success();

    let out_dir = workspace.path().join("exports");
    fs::create_dir_all(&out_dir).expect("create export dir");
    let param = format!("path={}", out_dir.display());
    report(&configs, &["export_csv", "-p", param.as_str()])
        .assert()
        .success()
        .stdout(contains("Exported 3 row(s)"));

    let exported = fs::read(out_dir.join("exported_data.csv")).expect("export written");
    assert_eq!(exported, fs::read(&configs.store).expect("store"));
}

#[test]
fn report_without_store_fails_cleanly() {
    let workspace = TestWorkspace::new();
    let configs = workspace.write_configs();
    report(&configs, &["list_carriers"])
        .assert()
        .failure()
        .stderr(contains("ingest a file first"));
}

#[test]
fn commands_lists_registered_reports() {
    bin()
        .arg("commands")
        .assert()
        .success()
        .stdout(
            contains("top_k_earners")
                .and(contains("k:int, period:string"))
                .and(contains("export_csv")),
        );
}
