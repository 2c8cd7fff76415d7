//! Output Formatting and Display Management
//!
//! This module handles all output formatting for report query results. It provides
//! human-readable terminal output with colors, structured JSON output for programmatic
//! consumption and CSV for flat exports.
//!
//! ## Core Functionality
//!
//! ### Output Formats
//! - **Terminal Output**: Per-date breakdown of the first group-by dimension with each
//!   group's share of the date's cost
//! - **JSON Output**: The full [`ReportResponse`], nested tree and packed total included
//! - **CSV Output**: One line per grouped row, columns sorted by name
//!
//! ### Listings
//! - **Providers**: Report types and group-by options of every provider
//! - **Rates**: The exchange-rate table in use
//!
//! ## Usage Example
//!
//! ```rust
//! use cost_report::display::DisplayManager;
//! use cost_report::ExchangeRateTable;
//!
//! let display_manager = DisplayManager::new();
//! display_manager.display_rates(&ExchangeRateTable::canonical(), false).unwrap();
//! ```

use crate::currency::ExchangeRateTable;
use crate::models::{field, DateBucket, ReportData, ReportResponse, Row, Value, OTHERS};
use crate::provider_map::ProviderMap;
use crate::tree::GroupNode;
use anyhow::{Context, Result};
use colored::Colorize;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

/// Measure shown in the terminal summary.
const SUMMARY_MEASURE: &str = "cost_total";

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn render_json(&self, response: &ReportResponse, pretty: bool) -> Result<String> {
        let rendered = if pretty {
            serde_json::to_string_pretty(response)
        } else {
            serde_json::to_string(response)
        };
        rendered.context("Failed to serialize report to JSON")
    }

    /// Flat rows as CSV with a header of every column present.
    pub fn render_csv(&self, rows: &[Row]) -> Result<String> {
        let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
        let mut wtr = csv::Writer::from_writer(vec![]);

        wtr.write_record(columns.iter().map(|c| c.as_str()))
            .context("Failed to write CSV header")?;
        for row in rows {
            wtr.write_record(columns.iter().map(|c| field(row, c).label()))
                .context("Failed to write CSV row")?;
        }

        let bytes = wtr.into_inner().context("Failed to flush CSV output")?;
        String::from_utf8(bytes).context("CSV output is not valid UTF-8")
    }

    pub fn display_report(&self, response: &ReportResponse, json_output: bool, pretty: bool) -> Result<()> {
        if json_output {
            println!("{}", self.render_json(response, pretty)?);
            return Ok(());
        }

        let buckets = match &response.data {
            ReportData::Flat(rows) => {
                print!("{}", self.render_csv(rows)?);
                return Ok(());
            }
            ReportData::Tree(buckets) => buckets,
        };

        println!("\n{}", "=".repeat(80).bright_cyan());
        println!(
            "{}",
            format!("Cost Report ({})", response.currency)
                .bright_white()
                .bold()
        );
        println!("{}", "=".repeat(80).bright_cyan());

        let total = response.total.decimal(SUMMARY_MEASURE);
        println!(
            "\n{} {} dates • {} total\n",
            "📊".bright_yellow(),
            buckets.len().to_string().bright_white().bold(),
            format_amount(total, &response.currency).bright_green().bold()
        );

        if let Some(delta) = &response.delta {
            let percent = delta
                .percent
                .map(|p| format!("{}%", p.round_dp(1)))
                .unwrap_or_else(|| "n/a".to_string());
            println!(
                "{} change vs previous period: {} ({})\n",
                "📈".bright_blue(),
                format_amount(delta.value, &response.currency).bright_white().bold(),
                percent.bright_yellow()
            );
        }

        for bucket in buckets {
            self.display_bucket(bucket, &response.currency);
        }
        Ok(())
    }

    fn display_bucket(&self, bucket: &DateBucket, currency: &str) {
        let day_total: Decimal = bucket
            .groups
            .iter()
            .map(node_measure)
            .chain(bucket.values.iter().map(row_measure))
            .fold(Decimal::ZERO, Decimal::saturating_add);

        println!(
            "{} {}: {}",
            "📅".bright_blue(),
            bucket.date.bright_white().bold(),
            format_amount(day_total, currency).bright_green().bold()
        );

        for group in &bucket.groups {
            let cost = node_measure(group);
            let percentage = if day_total.is_zero() {
                Decimal::ZERO
            } else {
                cost / day_total * Decimal::ONE_HUNDRED
            };
            let label = match group.attributes.first() {
                Some((_, alias)) if !alias.is_null() && alias.label() != group.key.label() => {
                    format!("{} ({})", group.key.label(), alias.label())
                }
                _ => group.key.label(),
            };
            let label = if group.key == Value::from(OTHERS) {
                label.bright_black()
            } else {
                label.bright_cyan()
            };
            println!(
                "   {}: {} ({}%)",
                label,
                format_amount(cost, currency).bright_green(),
                percentage.round_dp(0).to_string().bright_yellow()
            );
        }
        println!();
    }

    pub fn display_providers(&self, maps: &[ProviderMap], json_output: bool) -> Result<()> {
        if json_output {
            let listing: Vec<serde_json::Value> = maps
                .iter()
                .map(|map| {
                    serde_json::json!({
                        "provider": map.provider.as_str(),
                        "report_type": map.report_type.as_str(),
                        "group_by": map.group_by_options(),
                        "measures": map.measures().iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
                        "default_ordering": map.report_type_map.default_ordering,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&listing).context("Failed to serialize providers")?
            );
            return Ok(());
        }

        let mut current = None;
        for map in maps {
            if current != Some(map.provider) {
                println!("\n{}", map.provider.as_str().bright_white().bold());
                current = Some(map.provider);
            }
            println!(
                "   {}: group by {} (ordered by {})",
                map.report_type.as_str().bright_cyan(),
                map.group_by_options().join(", "),
                map.report_type_map.default_ordering.bright_yellow()
            );
        }
        println!();
        Ok(())
    }

    pub fn display_rates(&self, rates: &ExchangeRateTable, json_output: bool) -> Result<()> {
        if json_output {
            println!(
                "{}",
                serde_json::to_string_pretty(rates).context("Failed to serialize rates")?
            );
            return Ok(());
        }

        for (source, target, rate) in rates.pairs().filter(|(s, t, _)| s != t) {
            println!(
                "   {} → {}: {}",
                source.bright_white().bold(),
                target.bright_white(),
                rate.normalize().to_string().bright_green()
            );
        }
        Ok(())
    }
}

fn row_measure(row: &Row) -> Decimal {
    field(row, SUMMARY_MEASURE).as_decimal().unwrap_or(Decimal::ZERO)
}

fn node_measure(node: &GroupNode) -> Decimal {
    node.rows()
        .into_iter()
        .map(row_measure)
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{} {}", amount.round_dp(2), currency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_csv_header_and_quoting() {
        let rows = vec![
            row([("account", Value::from("A, Inc")), ("cost_total", Value::from(dec!(1.5)))]),
            row([("account", Value::from("B")), ("rank", Value::from(2i64))]),
        ];

        let csv = DisplayManager::new().render_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "account,cost_total,rank");
        assert_eq!(lines[1], "\"A, Inc\",1.5,");
        assert_eq!(lines[2], "B,,2");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(5.355), "USD"), "5.36 USD");
    }
}
