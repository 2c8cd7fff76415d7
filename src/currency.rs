//! Currency Conversion
//!
//! Monetary measures arrive in the currency of the billing source that produced them. Before
//! rows from different sources can be summed they are re-expressed in the single currency
//! requested by the caller.
//!
//! ## Exchange-Rate Table
//!
//! [`ExchangeRateTable`] maps `source → {target → rate}`. The table is directional: a rate from
//! EUR to USD says nothing about USD to EUR. Identity conversions are explicit rows
//! (`USD → USD = 1`) rather than a short-circuit, so every conversion goes through the same
//! lookup. A pair without a row is a [`ReportError::MissingRate`], never a silent skip.
//!
//! The table is built once (from [`ExchangeRateTable::canonical`] or a TOML file) and shared
//! read-only behind an `Arc`; tests inject their own table instead of patching a global.
//!
//! ## Rate File Format
//!
//! ```toml
//! [rates.EUR]
//! USD = "1.07"
//! CAD = "1.25"
//! ```

use crate::error::{ReportError, ReportResult};
use crate::models::{Row, Value};
use crate::provider_map::Measure;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateTable {
    rates: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl ExchangeRateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rate table shared by every provider's report handler.
    pub fn canonical() -> Self {
        let mut table = Self::new();
        table.insert("EUR", "USD", dec!(1.071811361200428747153523545));
        table.insert("EUR", "CAD", dec!(1.25));
        table.insert("GBP", "USD", dec!(1.254705144291091478692123928));
        table.insert("GBP", "CAD", dec!(1.34));
        table.insert("JPY", "USD", dec!(0.007456565505927968857957655));
        table.insert("JPY", "CAD", dec!(1.34));
        table.insert("AUD", "USD", dec!(0.7194244604));
        table.insert("AUD", "CAD", dec!(1.34));
        for code in ["USD", "EUR", "GBP", "JPY", "AUD", "CAD"] {
            table.insert(code, code, Decimal::ONE);
        }
        table
    }

    /// Load a table from a TOML rate file. Every currency named in the file gets an identity row.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rate file: {}", path.display()))?;
        let mut table: ExchangeRateTable = toml::from_str(&content)
            .with_context(|| format!("Failed to parse rate file: {}", path.display()))?;
        table.add_identity_rows();

        info!(
            path = %path.display(),
            currencies = table.currencies().len(),
            "Loaded exchange rates from file"
        );
        Ok(table)
    }

    pub fn insert(&mut self, source: &str, target: &str, rate: Decimal) {
        self.rates
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string(), rate);
    }

    pub fn get(&self, source: &str, target: &str) -> Option<Decimal> {
        self.rates.get(source).and_then(|targets| targets.get(target)).copied()
    }

    /// Every currency code appearing as a source or a target.
    pub fn currencies(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .rates
            .iter()
            .flat_map(|(source, targets)| {
                std::iter::once(source.clone()).chain(targets.keys().cloned())
            })
            .collect();
        codes.sort();
        codes.dedup();
        codes
    }

    /// Iterate `(source, target, rate)` in source then target order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str, Decimal)> {
        self.rates.iter().flat_map(|(source, targets)| {
            targets
                .iter()
                .map(move |(target, rate)| (source.as_str(), target.as_str(), *rate))
        })
    }

    fn add_identity_rows(&mut self) {
        for code in self.currencies() {
            self.insert(&code, &code, Decimal::ONE);
        }
    }
}

/// Converts monetary values using an injected, read-only rate table.
#[derive(Debug, Clone)]
pub struct CurrencyConverter {
    rates: Arc<ExchangeRateTable>,
}

impl CurrencyConverter {
    pub fn new(rates: Arc<ExchangeRateTable>) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &ExchangeRateTable {
        &self.rates
    }

    pub fn rate(&self, source: &str, target: &str) -> ReportResult<Decimal> {
        self.rates
            .get(source, target)
            .ok_or_else(|| ReportError::MissingRate {
                source_currency: source.to_string(),
                target_currency: target.to_string(),
            })
    }

    pub fn convert(&self, value: Decimal, source: &str, target: &str) -> ReportResult<Decimal> {
        let rate = self.rate(source, target)?;
        value
            .checked_mul(rate)
            .ok_or_else(|| ReportError::ConversionOverflow {
                value: value.to_string(),
                source_currency: source.to_string(),
                target_currency: target.to_string(),
            })
    }

    /// Convert every measure of `row` in place. Unit columns, identifiers, aliases and
    /// cluster lists are not measures and are left untouched.
    pub fn convert_row(
        &self,
        row: &mut Row,
        measures: &[Measure],
        source: &str,
        target: &str,
    ) -> ReportResult<()> {
        for measure in measures {
            if let Some(Value::Decimal(amount)) = row.get(&measure.name) {
                let converted = self.convert(*amount, source, target)?;
                row.insert(measure.name.clone(), Value::Decimal(converted));
            }
        }
        debug!(source, target, "Converted row measures");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_map::AggRule;
    use std::io::Write;

    fn converter() -> CurrencyConverter {
        CurrencyConverter::new(Arc::new(ExchangeRateTable::canonical()))
    }

    #[test]
    fn test_identity_for_every_currency() {
        let converter = converter();
        for code in converter.rates().currencies() {
            for value in [dec!(0), dec!(1), dec!(-3.5), dec!(123456789.123456789)] {
                assert_eq!(converter.convert(value, &code, &code).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_directional_rates() {
        let converter = converter();
        assert!(converter.convert(dec!(10), "EUR", "USD").is_ok());
        let err = converter.convert(dec!(10), "USD", "EUR").unwrap_err();
        assert!(err.is_conversion());
        assert_eq!(err.to_string(), "No exchange rate from USD to EUR");
    }

    #[test]
    fn test_injected_table() {
        let mut table = ExchangeRateTable::new();
        table.insert("EUR", "USD", dec!(1.07));
        let converter = CurrencyConverter::new(Arc::new(table));
        assert_eq!(converter.convert(dec!(5), "EUR", "USD").unwrap(), dec!(5.35));
    }

    #[test]
    fn test_convert_row_converts_every_measure() {
        let mut table = ExchangeRateTable::new();
        table.insert("EUR", "USD", dec!(2));
        let converter = CurrencyConverter::new(Arc::new(table));
        let measures = vec![
            Measure::new("cost_total", AggRule::Sum),
            Measure::new("usage", AggRule::Sum),
        ];
        let mut row = crate::models::row([
            ("cost_total", Value::from(dec!(3))),
            ("usage", Value::from(dec!(7))),
            ("account_alias", Value::from("prod")),
        ]);
        converter.convert_row(&mut row, &measures, "EUR", "USD").unwrap();
        assert_eq!(row["cost_total"], Value::from(dec!(6)));
        assert_eq!(row["usage"], Value::from(dec!(14)));
        assert_eq!(row["account_alias"], Value::from("prod"));
    }

    #[test]
    fn test_load_from_file_adds_identity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rates.EUR]\nUSD = \"1.07\"\n").unwrap();
        let table = ExchangeRateTable::load_from_file(file.path()).unwrap();
        assert_eq!(table.get("EUR", "USD"), Some(dec!(1.07)));
        assert_eq!(table.get("EUR", "EUR"), Some(Decimal::ONE));
        assert_eq!(table.get("USD", "USD"), Some(Decimal::ONE));
        assert_eq!(table.get("USD", "EUR"), None);
    }
}
