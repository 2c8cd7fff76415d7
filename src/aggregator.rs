//! Aggregation Engine
//!
//! Groups annotated rows by `(group-by dimensions)` and produces one summed row per group,
//! expressed in the target currency, plus a grand total over the whole dataset.
//!
//! ## Two-Phase Aggregation
//!
//! Rows from different billing sources carry different currencies and cannot be summed
//! directly. Aggregation therefore runs in two phases:
//!
//! 1. **Per currency**: rows are partitioned by `(group key, source currency)` and each
//!    partition is folded with the measure rules ([`AggRule::Sum`] / [`AggRule::Max`])
//! 2. **Across currencies**: every partition is converted to the target currency and the
//!    partitions sharing a group key are folded again into a single row
//!
//! The grand total runs the same two phases with an empty group key.
//!
//! ## Non-numeric Columns
//!
//! Columns that are not measures are never summed. Unit columns (names ending in `units`)
//! keep the maximum value, string lists (e.g. `clusters`) keep the distinct union in
//! first-seen order, and every other column keeps its first-seen value.
//!
//! ## Ordering
//!
//! Output rows follow the first appearance of their group key in the input, which keeps
//! aggregation deterministic without imposing an order the orderer would override anyway.

use crate::currency::CurrencyConverter;
use crate::error::{checked_add, ReportResult};
use crate::models::{field, GroupKey, Row, Value};
use crate::provider_map::{AggRule, Measure};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// Column written on every aggregated row with the target currency.
pub const COST_UNITS_FIELD: &str = "cost_units";

/// Grouped rows and grand total of one aggregation.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub rows: Vec<Row>,
    pub total: Row,
}

pub struct Aggregator<'a> {
    converter: &'a CurrencyConverter,
    measures: &'a [Measure],
    currency_field: String,
    retained: Vec<String>,
    unit_fallbacks: Vec<(String, String)>,
}

impl<'a> Aggregator<'a> {
    /// `currency_field` names the column holding each row's source currency.
    pub fn new(converter: &'a CurrencyConverter, measures: &'a [Measure], currency_field: &str) -> Self {
        Self {
            converter,
            measures,
            currency_field: currency_field.to_string(),
            retained: Vec::new(),
            unit_fallbacks: Vec::new(),
        }
    }

    /// Non-measure columns carried onto grouped rows.
    pub fn with_retained(mut self, columns: Vec<String>) -> Self {
        self.retained = columns;
        self
    }

    /// Unit values written on the total when no row provides one.
    pub fn with_unit_fallbacks(mut self, fallbacks: Vec<(String, String)>) -> Self {
        self.unit_fallbacks = fallbacks;
        self
    }

    pub fn aggregate(&self, rows: &[Row], group_by_fields: &[String], target: &str) -> ReportResult<Aggregation> {
        let grouped = self.aggregate_rows(rows, group_by_fields, &self.retained, target)?;

        let unit_columns: Vec<String> = self
            .retained
            .iter()
            .filter(|c| is_units_column(c))
            .cloned()
            .collect();
        let mut total = self
            .aggregate_rows(rows, &[], &unit_columns, target)?
            .pop()
            .unwrap_or_else(|| self.zero_row(&[], &GroupKey(Vec::new()), target));
        for (column, fallback) in &self.unit_fallbacks {
            if field(&total, column).is_null() {
                total.insert(column.clone(), Value::Text(fallback.clone()));
            }
        }

        debug!(
            input_rows = rows.len(),
            grouped_rows = grouped.len(),
            group_by = ?group_by_fields,
            target,
            "Aggregated rows"
        );

        Ok(Aggregation { rows: grouped, total })
    }

    fn aggregate_rows(
        &self,
        rows: &[Row],
        key_fields: &[String],
        retained: &[String],
        target: &str,
    ) -> ReportResult<Vec<Row>> {
        // Phase 1: fold per (group key, source currency).
        let mut partitions: Vec<(GroupKey, String, Row)> = Vec::new();
        let mut index: HashMap<(GroupKey, String), usize> = HashMap::new();
        for row in rows {
            let key = GroupKey::from_row(row, key_fields);
            let currency = field(row, &self.currency_field).label();
            match index.get(&(key.clone(), currency.clone())) {
                Some(&i) => self.merge(&mut partitions[i].2, row, retained)?,
                None => {
                    index.insert((key.clone(), currency.clone()), partitions.len());
                    let projected = self.project(row, key_fields, retained);
                    partitions.push((key, currency, projected));
                }
            }
        }

        // Phase 2: convert each partition, then fold across currencies.
        let mut grouped: Vec<Row> = Vec::new();
        let mut grouped_index: HashMap<GroupKey, usize> = HashMap::new();
        for (key, currency, mut partition) in partitions {
            self.converter
                .convert_row(&mut partition, self.measures, &currency, target)?;
            match grouped_index.get(&key) {
                Some(&i) => self.merge(&mut grouped[i], &partition, retained)?,
                None => {
                    grouped_index.insert(key, grouped.len());
                    grouped.push(partition);
                }
            }
        }

        for row in &mut grouped {
            row.insert(COST_UNITS_FIELD.to_string(), Value::Text(target.to_string()));
        }
        Ok(grouped)
    }

    /// First row of a partition: key fields, measures (zero when absent) and retained columns.
    fn project(&self, row: &Row, key_fields: &[String], retained: &[String]) -> Row {
        let mut projected = self.zero_row(key_fields, &GroupKey::from_row(row, key_fields), "");
        projected.remove(COST_UNITS_FIELD);
        for measure in self.measures {
            if let Some(Value::Decimal(amount)) = row.get(&measure.name) {
                projected.insert(measure.name.clone(), Value::Decimal(*amount));
            }
        }
        for column in retained {
            if let Some(value) = row.get(column) {
                projected.insert(column.clone(), value.clone());
            }
        }
        projected
    }

    fn zero_row(&self, key_fields: &[String], key: &GroupKey, target: &str) -> Row {
        let mut row: Row = key_fields
            .iter()
            .cloned()
            .zip(key.values().iter().cloned())
            .collect();
        for measure in self.measures {
            row.insert(measure.name.clone(), Value::Decimal(Decimal::ZERO));
        }
        row.insert(COST_UNITS_FIELD.to_string(), Value::Text(target.to_string()));
        row
    }

    fn merge(&self, acc: &mut Row, row: &Row, retained: &[String]) -> ReportResult<()> {
        for measure in self.measures {
            let Some(Value::Decimal(incoming)) = row.get(&measure.name) else {
                continue;
            };
            let merged = match (acc.get(&measure.name), measure.rule) {
                (Some(Value::Decimal(current)), AggRule::Sum) => {
                    checked_add(*current, *incoming, &measure.name)?
                }
                (Some(Value::Decimal(current)), AggRule::Max) => (*current).max(*incoming),
                _ => *incoming,
            };
            acc.insert(measure.name.clone(), Value::Decimal(merged));
        }

        for column in retained {
            let incoming = field(row, column);
            if incoming.is_null() {
                continue;
            }
            let merged = merge_retained(column, field(acc, column), incoming);
            acc.insert(column.clone(), merged);
        }
        Ok(())
    }
}

fn is_units_column(column: &str) -> bool {
    column.ends_with("units")
}

fn merge_retained(column: &str, current: &Value, incoming: &Value) -> Value {
    match (current, incoming) {
        (Value::Null, _) => incoming.clone(),
        (Value::List(current), Value::List(incoming)) => {
            let mut union = current.clone();
            for item in incoming {
                if !union.contains(item) {
                    union.push(item.clone());
                }
            }
            Value::List(union)
        }
        _ if is_units_column(column) => current.clone().max(incoming.clone()),
        _ => current.clone(),
    }
}
