//! Row annotation
//!
//! Rows arrive with provider column names (`usage_account_id`, `namespace`, `project_id`, ...).
//! Before aggregation every row is annotated with the query-parameter names the rest of the
//! pipeline works with, its unit columns are coalesced with the report type's fallbacks, and
//! its `date` is truncated to the query resolution. Measures written as decimal strings are
//! read as decimals.

use crate::dates::Resolution;
use crate::error::{ReportError, ReportResult};
use crate::models::{Row, Value, DATE_FIELD};
use crate::provider_map::ProviderMap;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Source column the date is derived from when a row has no `date`.
pub const USAGE_START_FIELD: &str = "usage_start";

pub struct Annotator {
    annotations: Vec<(String, String)>,
    measures: Vec<String>,
    cost_units_key: String,
    cost_units_fallback: String,
    usage_units: Option<(Option<String>, String)>,
    count_units_fallback: Option<String>,
    resolution: Resolution,
}

impl Annotator {
    pub fn new(map: &ProviderMap, group_by: &[String], resolution: Resolution) -> Self {
        let usage_units = map
            .report_type_map
            .usage_units_fallback
            .clone()
            .map(|fallback| (map.fields.usage_units_key.clone(), fallback));

        Self {
            annotations: map.annotations_for(group_by),
            measures: map.measures().iter().map(|m| m.name.clone()).collect(),
            cost_units_key: map.cost_units_key().to_string(),
            cost_units_fallback: map.report_type_map.cost_units_fallback.clone(),
            usage_units,
            count_units_fallback: map.report_type_map.count_units_fallback.clone(),
            resolution,
        }
    }

    pub fn annotate(&self, mut row: Row) -> ReportResult<Row> {
        for (param, source) in &self.annotations {
            if row.get(param).map_or(true, Value::is_null) {
                if let Some(value) = row.get(source).cloned() {
                    row.insert(param.clone(), value);
                }
            }
        }

        for measure in &self.measures {
            let parsed = match row.get(measure) {
                Some(Value::Text(text)) => Decimal::from_str(text.trim()).map_err(|_| {
                    ReportError::InvalidRow(format!("{} is not a decimal: {}", measure, text))
                })?,
                _ => continue,
            };
            row.insert(measure.clone(), Value::Decimal(parsed));
        }

        coalesce(&mut row, &self.cost_units_key, None, &self.cost_units_fallback);
        if let Some((source, fallback)) = &self.usage_units {
            coalesce(&mut row, "usage_units", source.as_deref(), fallback);
        }
        if let Some(fallback) = &self.count_units_fallback {
            coalesce(&mut row, "count_units", None, fallback);
        }

        let date = match (row.get(DATE_FIELD), row.get(USAGE_START_FIELD)) {
            (Some(Value::Text(date)), _) | (None | Some(Value::Null), Some(Value::Text(date))) => {
                self.resolution.truncate(date)?
            }
            _ => {
                return Err(ReportError::InvalidRow(format!(
                    "row has neither a {} nor a {} value",
                    DATE_FIELD, USAGE_START_FIELD
                )))
            }
        };
        row.insert(DATE_FIELD.to_string(), Value::Text(date));

        Ok(row)
    }

    pub fn annotate_all(&self, rows: Vec<Row>) -> ReportResult<Vec<Row>> {
        rows.into_iter().map(|row| self.annotate(row)).collect()
    }
}

/// Fill `field` from `source` and then `fallback` when it is missing or null.
fn coalesce(row: &mut Row, field: &str, source: Option<&str>, fallback: &str) {
    if !row.get(field).map_or(true, Value::is_null) {
        return;
    }
    let value = source
        .and_then(|s| row.get(s))
        .filter(|v| !v.is_null())
        .cloned()
        .unwrap_or_else(|| Value::Text(fallback.to_string()));
    row.insert(field.to_string(), value);
}
