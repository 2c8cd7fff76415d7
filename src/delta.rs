//! Period-over-period deltas.
//!
//! The previous period's rows go through the same annotation and aggregation as the current
//! ones, with their dates moved forward so that each previous bucket lines up with the
//! current bucket it is compared to.

use crate::dates::{shift_months, Resolution};
use crate::error::{checked_sub, ReportResult};
use crate::models::{field, GroupKey, Row, Value, DATE_FIELD};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub const DELTA_VALUE_FIELD: &str = "delta_value";
pub const DELTA_PERCENT_FIELD: &str = "delta_percent";

/// Comparison requested by the caller.
#[derive(Debug, Clone)]
pub struct DeltaSpec {
    /// Measure compared between the periods, e.g. `cost_total` or `usage`.
    pub measure: String,
    /// Already-filtered rows of the previous period.
    pub previous_rows: Vec<Row>,
    /// How many months separate the previous period from the current one.
    pub shift_months: u32,
}

impl DeltaSpec {
    pub fn new(measure: &str, previous_rows: Vec<Row>) -> Self {
        Self {
            measure: measure.to_string(),
            previous_rows,
            shift_months: 1,
        }
    }
}

/// Move the `date` of every row forward by `months`.
pub fn shift_rows(rows: Vec<Row>, months: u32, resolution: Resolution) -> ReportResult<Vec<Row>> {
    rows.into_iter()
        .map(|mut row| {
            if let Some(Value::Text(date)) = row.get(DATE_FIELD) {
                let shifted = shift_months(date, months, resolution)?;
                row.insert(DATE_FIELD.to_string(), Value::Text(shifted));
            }
            Ok(row)
        })
        .collect()
}

/// `(current - previous) / previous * 100`, undefined when there is nothing to compare to.
pub fn percent_delta(current: Decimal, previous: Decimal) -> Option<Decimal> {
    if previous.is_zero() {
        return None;
    }
    current
        .checked_sub(previous)
        .and_then(|change| change.checked_div(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

/// Annotate each current row with its change against the matching previous row.
pub fn apply_deltas(rows: &mut [Row], previous: &[Row], key_fields: &[String], measure: &str) -> ReportResult<()> {
    let previous_values: HashMap<GroupKey, Decimal> = previous
        .iter()
        .map(|row| {
            let value = field(row, measure).as_decimal().unwrap_or(Decimal::ZERO);
            (GroupKey::from_row(row, key_fields), value)
        })
        .collect();

    for row in rows.iter_mut() {
        let key = GroupKey::from_row(row, key_fields);
        let previous_value = previous_values.get(&key).copied().unwrap_or(Decimal::ZERO);
        let current_value = field(row, measure).as_decimal().unwrap_or(Decimal::ZERO);

        row.insert(
            DELTA_VALUE_FIELD.to_string(),
            Value::Decimal(checked_sub(current_value, previous_value, measure)?),
        );
        row.insert(
            DELTA_PERCENT_FIELD.to_string(),
            percent_delta(current_value, previous_value).map_or(Value::Null, Value::Decimal),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percent_delta() {
        assert_eq!(percent_delta(dec!(15), dec!(10)), Some(dec!(50)));
        assert_eq!(percent_delta(dec!(5), dec!(10)), Some(dec!(-50)));
        assert_eq!(percent_delta(dec!(5), dec!(0)), None);
    }

    #[test]
    fn test_apply_deltas_matches_on_date_and_group() {
        let keys = vec!["date".to_string(), "account".to_string()];
        let mut current = vec![
            row([("date", Value::from("2022-06")), ("account", Value::from("A")), ("cost_total", Value::from(dec!(12)))]),
            row([("date", Value::from("2022-06")), ("account", Value::from("B")), ("cost_total", Value::from(dec!(3)))]),
        ];
        let previous = shift_rows(
            vec![row([
                ("date", Value::from("2022-05")),
                ("account", Value::from("A")),
                ("cost_total", Value::from(dec!(8))),
            ])],
            1,
            Resolution::Monthly,
        )
        .unwrap();

        apply_deltas(&mut current, &previous, &keys, "cost_total").unwrap();

        assert_eq!(current[0]["delta_value"], Value::from(dec!(4)));
        assert_eq!(current[0]["delta_percent"], Value::from(dec!(50)));
        assert_eq!(current[1]["delta_value"], Value::from(dec!(3)));
        assert_eq!(current[1]["delta_percent"], Value::Null);
    }

    #[test]
    fn test_delta_overflow_is_an_error() {
        let keys = vec!["account".to_string()];
        let mut current = vec![row([("account", Value::from("A")), ("cost_total", Value::from(Decimal::MAX))])];
        let previous = vec![row([("account", Value::from("A")), ("cost_total", Value::from(Decimal::MIN))])];

        assert!(apply_deltas(&mut current, &previous, &keys, "cost_total").is_err());
        assert_eq!(percent_delta(Decimal::MAX, Decimal::MIN), None);
    }
}
