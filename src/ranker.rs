//! Top-N ranking with an "Others" overflow bucket.
//!
//! Within each date slice, groups are ranked by one measure (highest first, ties broken by
//! the ascending group key). The first `limit` groups keep their rows with a `rank` column;
//! every remaining group of the slice is merged into a single synthetic row whose dimension
//! values read `"Others"`, whose `others` column counts the merged groups, and whose rank is
//! `limit + 1`.

use crate::error::{checked_add, ReportResult};
use crate::models::{field, row_date, GroupKey, Row, Value, OTHERS, RANK_FIELD};
use crate::provider_map::{AggRule, Measure};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::debug;

/// Column on the overflow row counting the groups it absorbed.
pub const OTHERS_COUNT_FIELD: &str = "others";

pub struct Ranker<'a> {
    measures: &'a [Measure],
    alias_fields: Vec<String>,
}

impl<'a> Ranker<'a> {
    pub fn new(measures: &'a [Measure]) -> Self {
        Self {
            measures,
            alias_fields: Vec::new(),
        }
    }

    /// Columns relabelled `"Others"` on the overflow row alongside the dimensions.
    pub fn with_alias_fields(mut self, alias_fields: Vec<String>) -> Self {
        self.alias_fields = alias_fields;
        self
    }

    pub fn rank(
        &self,
        rows: Vec<Row>,
        group_by_fields: &[String],
        limit: usize,
        rank_measure: &str,
    ) -> ReportResult<Vec<Row>> {
        if limit == 0 {
            return Ok(rows);
        }

        let mut slices: Vec<(Option<String>, Vec<Row>)> = Vec::new();
        for row in rows {
            let date = row_date(&row).map(str::to_string);
            match slices.iter_mut().find(|(d, _)| *d == date) {
                Some((_, slice)) => slice.push(row),
                None => slices.push((date, vec![row])),
            }
        }

        let mut ranked = Vec::new();
        for (date, mut slice) in slices {
            slice.sort_by(|a, b| compare_for_rank(a, b, group_by_fields, rank_measure));

            let overflow = if slice.len() > limit {
                slice.split_off(limit)
            } else {
                Vec::new()
            };

            for (position, mut row) in slice.into_iter().enumerate() {
                row.insert(RANK_FIELD.to_string(), Value::from((position + 1) as i64));
                ranked.push(row);
            }

            if !overflow.is_empty() {
                debug!(date = ?date, merged_groups = overflow.len(), "Collapsing groups into Others");
                ranked.push(self.others_row(date, &overflow, group_by_fields, limit)?);
            }
        }
        Ok(ranked)
    }

    fn others_row(
        &self,
        date: Option<String>,
        overflow: &[Row],
        group_by_fields: &[String],
        limit: usize,
    ) -> ReportResult<Row> {
        let mut others = Row::new();
        if let Some(date) = date {
            others.insert(crate::models::DATE_FIELD.to_string(), Value::Text(date));
        }
        for name in group_by_fields.iter().chain(self.alias_fields.iter()) {
            others.insert(name.clone(), Value::from(OTHERS));
        }

        for measure in self.measures {
            let mut values = overflow.iter().filter_map(|r| field(r, &measure.name).as_decimal());
            let merged = match measure.rule {
                AggRule::Sum => {
                    values.try_fold(Decimal::ZERO, |acc, v| checked_add(acc, v, &measure.name))?
                }
                AggRule::Max => values.max().unwrap_or(Decimal::ZERO),
            };
            others.insert(measure.name.clone(), Value::Decimal(merged));
        }

        for row in overflow {
            for (name, value) in row {
                if !name.ends_with("units") || value.is_null() {
                    continue;
                }
                let merged = match others.get(name) {
                    Some(current) if current >= value => current.clone(),
                    _ => value.clone(),
                };
                others.insert(name.clone(), merged);
            }
        }

        others.insert(OTHERS_COUNT_FIELD.to_string(), Value::from(overflow.len() as i64));
        others.insert(RANK_FIELD.to_string(), Value::from((limit + 1) as i64));
        Ok(others)
    }
}

/// Highest measure first; equal measures fall back to the ascending group key.
fn compare_for_rank(a: &Row, b: &Row, group_by_fields: &[String], rank_measure: &str) -> Ordering {
    let measure = |r: &Row| field(r, rank_measure).as_decimal().unwrap_or(Decimal::ZERO);
    measure(b)
        .cmp(&measure(a))
        .then_with(|| GroupKey::from_row(a, group_by_fields).cmp(&GroupKey::from_row(b, group_by_fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use rust_decimal_macros::dec;

    fn measures() -> Vec<Measure> {
        vec![
            Measure::new("cost_total", AggRule::Sum),
            Measure::new("capacity", AggRule::Max),
        ]
    }

    fn group(date: &str, account: &str, cost: Decimal) -> Row {
        row([
            ("date", Value::from(date)),
            ("account", Value::from(account)),
            ("account_alias", Value::from(format!("{}-alias", account))),
            ("cost_total", Value::from(cost)),
            ("cost_units", Value::from("USD")),
        ])
    }

    fn dims() -> Vec<String> {
        vec!["account".to_string()]
    }

    #[test]
    fn test_top_n_and_others_per_date() {
        let measures = measures();
        let ranker = Ranker::new(&measures).with_alias_fields(vec!["account_alias".to_string()]);
        let rows = vec![
            group("2022-06-01", "A", dec!(1)),
            group("2022-06-01", "B", dec!(5)),
            group("2022-06-01", "C", dec!(3)),
            group("2022-06-02", "A", dec!(9)),
        ];

        let ranked = ranker.rank(rows, &dims(), 2, "cost_total").unwrap();

        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0]["account"], Value::from("B"));
        assert_eq!(ranked[0]["rank"], Value::from(1i64));
        assert_eq!(ranked[1]["account"], Value::from("C"));
        let others = &ranked[2];
        assert_eq!(others["account"], Value::from("Others"));
        assert_eq!(others["account_alias"], Value::from("Others"));
        assert_eq!(others["cost_total"], Value::from(dec!(1)));
        assert_eq!(others["others"], Value::from(1i64));
        assert_eq!(others["rank"], Value::from(3i64));
        assert_eq!(others["cost_units"], Value::from("USD"));
        assert_eq!(ranked[3]["date"], Value::from("2022-06-02"));
        assert_eq!(ranked[3]["rank"], Value::from(1i64));
    }

    #[test]
    fn test_ties_break_on_group_key() {
        let measures = measures();
        let ranker = Ranker::new(&measures);
        let rows = vec![
            group("2022-06-01", "C", dec!(2)),
            group("2022-06-01", "A", dec!(2)),
            group("2022-06-01", "B", dec!(2)),
        ];

        let ranked = ranker.rank(rows, &dims(), 1, "cost_total").unwrap();

        assert_eq!(ranked[0]["account"], Value::from("A"));
        assert_eq!(ranked[1]["others"], Value::from(2i64));
        assert_eq!(ranked[1]["cost_total"], Value::from(dec!(4)));
    }

    #[test]
    fn test_no_others_when_under_limit() {
        let measures = measures();
        let ranker = Ranker::new(&measures);
        let rows = vec![group("2022-06-01", "A", dec!(2))];
        let ranked = ranker.rank(rows, &dims(), 3, "cost_total").unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0]["rank"], Value::from(1i64));
    }

    #[test]
    fn test_zero_limit_is_noop() {
        let measures = measures();
        let ranker = Ranker::new(&measures);
        let rows = vec![group("2022-06-01", "A", dec!(2)), group("2022-06-01", "B", dec!(3))];
        let ranked = ranker.rank(rows.clone(), &dims(), 0, "cost_total").unwrap();
        assert_eq!(ranked, rows);
    }

    #[test]
    fn test_others_sum_overflow_is_an_error() {
        let measures = measures();
        let ranker = Ranker::new(&measures);
        let rows = vec![
            group("2022-06-01", "A", Decimal::MAX),
            group("2022-06-01", "B", Decimal::MAX),
            group("2022-06-01", "C", Decimal::MAX),
        ];
        assert!(ranker.rank(rows, &dims(), 1, "cost_total").is_err());
    }
}
