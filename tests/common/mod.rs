#![allow(dead_code)]

use anyhow::Result;
use cost_report::models::{row, Row, Value};
use cost_report::ExchangeRateTable;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub fn create_test_jsonl(dir: &Path, filename: &str, content: &str) -> Result<()> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(())
}

/// USD/EUR table with the 1.07 rate used throughout the scenarios.
pub fn scenario_rates() -> Arc<ExchangeRateTable> {
    let mut table = ExchangeRateTable::new();
    table.insert("USD", "USD", Decimal::ONE);
    table.insert("EUR", "EUR", Decimal::ONE);
    table.insert("EUR", "USD", dec!(1.07));
    Arc::new(table)
}

/// AWS line item as the storage layer hands it over.
pub fn aws_line(date: &str, account: &str, cost: Decimal, currency: &str) -> Row {
    row([
        ("usage_start", Value::from(date)),
        ("usage_account_id", Value::from(account)),
        ("product_code", Value::from("AmazonEC2")),
        ("cost_total", Value::from(cost)),
        ("infra_total", Value::from(cost)),
        ("currency_code", Value::from(currency)),
    ])
}

/// Same line item as one JSON-lines record.
pub fn aws_jsonl(date: &str, account: &str, cost: &str, currency: &str) -> String {
    format!(
        r#"{{"usage_start":"{}","usage_account_id":"{}","product_code":"AmazonEC2","cost_total":{},"infra_total":{},"currency_code":"{}"}}"#,
        date, account, cost, cost, currency
    )
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
