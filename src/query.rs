//! Report Query Handler
//!
//! This module provides the handler that orchestrates one report query from filtered rows to
//! the nested response. It is the primary entry point of the library.
//!
//! ## Core Functionality
//!
//! The [`ReportQueryHandler`] is built from [`QueryParameters`] and a shared exchange-rate
//! table. Construction resolves and validates everything that does not depend on the data:
//!
//! - `and:` / `or:` prefixes are stripped from the group-by dimensions
//! - OpenShift-on-cloud cost queries grouped by project switch to `costs_by_project`
//! - The provider map is looked up and the group-by dimensions are checked against it
//! - A requested delta measure must be one of the report's measures
//!
//! ### Processing Pipeline
//! 1. **Annotation**: provider columns are copied onto parameter names, units coalesced,
//!    dates truncated to the resolution
//! 2. **Aggregation**: rows are grouped by date and group-by dimensions and converted to the
//!    target currency; the grand total is computed alongside
//! 3. **Ranking**: with a limit, each date keeps its top groups plus an `Others` row
//! 4. **Delta**: with a delta, every group is compared with the previous period
//! 5. **Ordering**: newest date first, then the requested or default terms
//! 6. **Nesting**: rows are wrapped in date buckets and nested by dimension, unless the
//!    caller asked for CSV
//!
//! ## Usage Example
//!
//! ```rust
//! use cost_report::{ExchangeRateTable, ProviderType, QueryParameters, ReportQueryHandler, ReportType};
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut params = QueryParameters::new(ProviderType::Aws, ReportType::Costs);
//! params.group_by = vec!["account".to_string()];
//! params.limit = Some(5);
//!
//! let handler = ReportQueryHandler::new(params, Arc::new(ExchangeRateTable::canonical()))?;
//! let response = handler.execute_query(Vec::new())?;
//! assert!(response.data.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::aggregator::{Aggregator, COST_UNITS_FIELD};
use crate::annotate::Annotator;
use crate::currency::{CurrencyConverter, ExchangeRateTable};
use crate::dates::{time_interval, Resolution};
use crate::delta::{apply_deltas, percent_delta, shift_rows, DeltaSpec};
use crate::error::{checked_sub, ReportError, ReportResult};
use crate::logging::query_span;
use crate::models::{
    row_date, DateBucket, Delta, ReportData, ReportResponse, Row, Total, Value, DATE_FIELD,
    RANK_FIELD,
};
use crate::orderer::Orderer;
use crate::provider_map::{effective_report_type, ProviderMap, ProviderType, ReportType};
use crate::ranker::Ranker;
use crate::tree::build_tree;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info};

pub const CSV_ACCEPT_TYPE: &str = "text/csv";
pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_DECIMAL_PLACES: u32 = 15;

/// Validated parameters of one report query.
#[derive(Debug, Clone)]
pub struct QueryParameters {
    pub provider: ProviderType,
    pub report_type: ReportType,
    /// Dimensions in nesting order; `and:` / `or:` prefixes are accepted.
    pub group_by: Vec<String>,
    /// Sort terms, `-` prefixed for descending. A date term anchors the group order.
    pub order_by: Vec<String>,
    pub limit: Option<usize>,
    pub currency: String,
    pub delta: Option<DeltaSpec>,
    pub accept_type: Option<String>,
    pub resolution: Resolution,
    /// Inclusive start and end of the query window.
    pub time_interval: Option<(NaiveDate, NaiveDate)>,
    pub decimal_places: u32,
}

impl QueryParameters {
    pub fn new(provider: ProviderType, report_type: ReportType) -> Self {
        Self {
            provider,
            report_type,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            currency: DEFAULT_CURRENCY.to_string(),
            delta: None,
            accept_type: None,
            resolution: Resolution::default(),
            time_interval: None,
            decimal_places: DEFAULT_DECIMAL_PLACES,
        }
    }

    /// True when the accept type asks for CSV, parameters such as `charset` included.
    pub fn is_csv(&self) -> bool {
        self.accept_type
            .as_deref()
            .map_or(false, |accept| accept.contains(CSV_ACCEPT_TYPE))
    }
}

/// Strip `and:` / `or:` prefixes and drop repeated dimensions.
pub fn normalize_group_by(group_by: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for dimension in group_by {
        let bare = dimension
            .strip_prefix("and:")
            .or_else(|| dimension.strip_prefix("or:"))
            .unwrap_or(dimension);
        if !normalized.iter().any(|d| d == bare) {
            normalized.push(bare.to_string());
        }
    }
    normalized
}

pub struct ReportQueryHandler {
    params: QueryParameters,
    group_by: Vec<String>,
    map: ProviderMap,
    converter: CurrencyConverter,
}

impl ReportQueryHandler {
    pub fn new(params: QueryParameters, rates: Arc<ExchangeRateTable>) -> ReportResult<Self> {
        let group_by = normalize_group_by(&params.group_by);
        let report_type = effective_report_type(params.provider, params.report_type, &group_by);
        let map = ProviderMap::new(params.provider, report_type)?;
        map.validate_group_by(&group_by)?;

        if let Some(delta) = &params.delta {
            if map.measure(&delta.measure).is_none() {
                return Err(ReportError::configuration(format!(
                    "Delta measure {} is not available for {} {} reports",
                    delta.measure, map.provider, map.report_type
                )));
            }
        }

        Ok(Self {
            params,
            group_by,
            map,
            converter: CurrencyConverter::new(rates),
        })
    }

    pub fn provider_map(&self) -> &ProviderMap {
        &self.map
    }

    /// Group-by dimensions with their logical prefixes removed.
    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Order terms applied to the grouped rows, newest date first.
    pub fn order_by(&self) -> Vec<String> {
        let explicit = !self.params.order_by.is_empty();
        let mut terms = if explicit {
            self.params.order_by.clone()
        } else {
            vec![format!("-{}", self.map.report_type_map.default_ordering)]
        };
        if self.params.limit.is_some() && !explicit {
            if let Some(last) = terms.last_mut() {
                *last = RANK_FIELD.to_string();
            }
        }
        if !terms.iter().any(|t| t.trim_start_matches('-') == DATE_FIELD) {
            terms.insert(0, format!("-{}", DATE_FIELD));
        }
        terms
    }

    /// Measure the ranker orders groups by: the first requested term naming a measure.
    pub fn rank_measure(&self) -> String {
        self.params
            .order_by
            .iter()
            .map(|term| term.trim_start_matches('-'))
            .find(|term| self.map.measure(term).is_some())
            .unwrap_or(&self.map.report_type_map.default_ordering)
            .to_string()
    }

    pub fn execute_query(&self, rows: Vec<Row>) -> ReportResult<ReportResponse> {
        let span = query_span(self.map.provider.as_str(), self.map.report_type.as_str());
        let _entered = span.enter();

        info!(
            input_rows = rows.len(),
            group_by = ?self.group_by,
            currency = %self.params.currency,
            "Executing report query"
        );

        let annotator = Annotator::new(&self.map, &self.group_by, self.params.resolution);
        let aggregator = self.aggregator();
        let key_fields = self.key_fields();
        let target = self.params.currency.as_str();

        let annotated = annotator.annotate_all(rows)?;
        let aggregation = aggregator.aggregate(&annotated, &key_fields, target)?;
        let mut grouped = aggregation.rows;
        let mut total_row = aggregation.total;

        if let Some(limit) = self.params.limit {
            let alias_fields = self
                .group_by
                .iter()
                .flat_map(|d| self.map.alias_fields(d))
                .collect();
            grouped = Ranker::new(self.map.measures())
                .with_alias_fields(alias_fields)
                .rank(grouped, &self.group_by, limit, &self.rank_measure())?;
        }

        let delta = match &self.params.delta {
            Some(spec) => {
                let previous = annotator.annotate_all(spec.previous_rows.clone())?;
                let previous = shift_rows(previous, spec.shift_months, self.params.resolution)?;
                let previous = aggregator.aggregate(&previous, &key_fields, target)?;
                apply_deltas(&mut grouped, &previous.rows, &key_fields, &spec.measure)?;

                let current_total = total_decimal(&total_row, &spec.measure);
                let previous_total = total_decimal(&previous.total, &spec.measure);
                Some(Delta {
                    value: checked_sub(current_total, previous_total, &spec.measure)?
                        .round_dp(self.params.decimal_places),
                    percent: percent_delta(current_total, previous_total)
                        .map(|p| p.round_dp(self.params.decimal_places)),
                })
            }
            None => None,
        };

        let order_by = self.order_by();
        let mut ordered = Orderer::new(&self.group_by).order(grouped, &order_by);
        for row in ordered.iter_mut() {
            round_row(row, self.params.decimal_places);
        }
        round_row(&mut total_row, self.params.decimal_places);

        let data = if self.params.is_csv() {
            ReportData::Flat(ordered)
        } else {
            ReportData::Tree(self.date_buckets(ordered))
        };

        let packed = self.map.pack_definitions.pack(&total_row);
        let total = Total {
            values: total_row,
            packed,
        };

        let cost_units = total.get(COST_UNITS_FIELD).map(|v| v.label()).unwrap_or_default();
        info!(
            cost_total = %total.decimal("cost_total"),
            cost_units = %cost_units,
            "Report query complete"
        );

        Ok(ReportResponse {
            group_by: self.params.group_by.clone(),
            order_by,
            limit: self.params.limit,
            currency: self.params.currency.clone(),
            data,
            total,
            delta,
        })
    }

    fn aggregator(&self) -> Aggregator<'_> {
        let mut fallbacks = Vec::new();
        if let Some(units) = &self.map.report_type_map.usage_units_fallback {
            fallbacks.push(("usage_units".to_string(), units.clone()));
        }
        if let Some(units) = &self.map.report_type_map.count_units_fallback {
            fallbacks.push(("count_units".to_string(), units.clone()));
        }

        Aggregator::new(&self.converter, self.map.measures(), self.map.cost_units_key())
            .with_retained(self.map.retained_columns(&self.group_by))
            .with_unit_fallbacks(fallbacks)
    }

    fn key_fields(&self) -> Vec<String> {
        std::iter::once(DATE_FIELD.to_string())
            .chain(self.group_by.iter().cloned())
            .collect()
    }

    /// One bucket per date of the query window (or per date present), newest first.
    fn date_buckets(&self, rows: Vec<Row>) -> Vec<DateBucket> {
        let mut dates: Vec<String> = match self.params.time_interval {
            Some((start, end)) => time_interval(start, end, self.params.resolution),
            None => {
                let mut present: Vec<String> =
                    rows.iter().filter_map(row_date).map(str::to_string).collect();
                present.sort();
                present.dedup();
                present
            }
        };
        dates.reverse();

        let alias_fields = |dimension: &str| self.map.alias_fields(dimension);
        let buckets: Vec<DateBucket> = dates
            .into_iter()
            .map(|date| {
                let members: Vec<Row> = rows
                    .iter()
                    .filter(|r| row_date(r) == Some(date.as_str()))
                    .cloned()
                    .map(|mut r| {
                        r.remove(RANK_FIELD);
                        r
                    })
                    .collect();
                match self.group_by.first() {
                    Some(dimension) => DateBucket {
                        date,
                        dimension: Some(dimension.clone()),
                        groups: build_tree(members, &self.group_by, &alias_fields),
                        values: Vec::new(),
                    },
                    None => DateBucket {
                        date,
                        dimension: None,
                        groups: Vec::new(),
                        values: members,
                    },
                }
            })
            .collect();

        debug!(buckets = buckets.len(), "Nested report rows");
        buckets
    }
}

fn total_decimal(total: &Row, measure: &str) -> rust_decimal::Decimal {
    total
        .get(measure)
        .and_then(Value::as_decimal)
        .unwrap_or_default()
}

fn round_row(row: &mut Row, decimal_places: u32) {
    for value in row.values_mut() {
        if let Value::Decimal(amount) = value {
            *amount = amount.round_dp(decimal_places);
        }
    }
}
