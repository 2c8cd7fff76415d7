//! Binary tests driving `cost-report` end to end

mod common;

use assert_cmd::Command;
use common::{aws_jsonl, create_test_jsonl};
use predicates::prelude::*;
use tempfile::TempDir;

fn cost_report(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cost-report").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("COST_REPORT_RATES_FILE")
        .env_remove("COST_REPORT_CURRENCY")
        .env("LOG_LEVEL", "error");
    cmd
}

fn write_rows(dir: &TempDir) {
    let content = [
        aws_jsonl("2022-06-01", "A", "10", "USD"),
        aws_jsonl("2022-06-01", "B", "5", "EUR"),
        "{broken json line that should be skipped}".to_string(),
    ]
    .join("\n");
    create_test_jsonl(dir.path(), "rows.jsonl", &content).unwrap();
}

#[test]
fn test_report_json_output() {
    let dir = TempDir::new().unwrap();
    write_rows(&dir);

    let output = cost_report(&dir)
        .args(["report", "--provider", "aws", "--rows", "rows.jsonl"])
        .args(["--group-by", "account", "--limit", "1", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let accounts = &json["data"][0]["accounts"];
    assert_eq!(accounts[0]["account"], "A");
    assert_eq!(accounts[1]["account"], "Others");
    assert_eq!(json["total"]["cost"]["total"]["units"], "USD");
    assert_eq!(json["limit"], 1);
}

#[test]
fn test_report_csv_output() {
    let dir = TempDir::new().unwrap();
    write_rows(&dir);

    cost_report(&dir)
        .args(["report", "--provider", "AWS", "--rows", "rows.jsonl"])
        .args(["--group-by", "account", "--order-by", "-cost_total", "--csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("account,"))
        .stdout(predicate::str::contains("cost_units"));
}

#[test]
fn test_report_terminal_summary() {
    let dir = TempDir::new().unwrap();
    write_rows(&dir);

    cost_report(&dir)
        .args(["report", "--provider", "aws", "--rows", "rows.jsonl", "--group-by", "account"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2022-06-01"))
        .stdout(predicate::str::contains("USD"));
}

#[test]
fn test_invalid_group_by_fails() {
    let dir = TempDir::new().unwrap();
    write_rows(&dir);

    cost_report(&dir)
        .args(["report", "--provider", "aws", "--rows", "rows.jsonl", "--group-by", "namespace"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot group"));
}

#[test]
fn test_json_error_output() {
    let dir = TempDir::new().unwrap();

    cost_report(&dir)
        .args(["report", "--provider", "aws", "--rows", "missing/*.jsonl", "--json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"error\""));
}

#[test]
fn test_providers_listing() {
    let dir = TempDir::new().unwrap();

    cost_report(&dir)
        .args(["providers", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OCP-on-AWS"))
        .stdout(predicate::str::contains("costs_by_project"));
}

#[test]
fn test_rates_from_config_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("rates.toml"), "[rates.EUR]\nUSD = \"2\"\n").unwrap();
    std::fs::write(
        dir.path().join("cost-report.toml"),
        "[report]\nrates_file = \"rates.toml\"\n",
    )
    .unwrap();

    cost_report(&dir)
        .args(["rates"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EUR"))
        .stdout(predicate::str::contains("2"));
}
