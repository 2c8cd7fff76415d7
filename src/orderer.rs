//! Result ordering
//!
//! Grouped rows are sorted by the requested terms (`field` ascending, `-field` descending)
//! with a stable multi-key sort. Null values sort last in both directions.
//!
//! ## Date-anchored ordering
//!
//! A term equal to one of the dates present in the rows (for example `2022-06-02`) is not a
//! sort key. It names the date whose group order wins: that date's rows are sorted by the
//! remaining terms, the resulting sequence of group keys is applied to every other date, and
//! the slices are then laid out newest date first. Groups missing from the anchor date follow
//! the anchored groups in the order the remaining terms give them.
//!
//! ## Unknown terms
//!
//! Terms naming a field that no row carries are dropped with a warning instead of failing
//! the query.

use crate::models::{field, row_date, GroupKey, Row, DATE_FIELD};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub descending: bool,
}

impl OrderTerm {
    pub fn parse(term: &str) -> Self {
        match term.strip_prefix('-') {
            Some(field) => Self {
                field: field.to_string(),
                descending: true,
            },
            None => Self {
                field: term.to_string(),
                descending: false,
            },
        }
    }

    fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let (left, right) = (field(a, &self.field), field(b, &self.field));
        match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if self.descending => right.cmp(left),
            (false, false) => left.cmp(right),
        }
    }
}

/// Stable sort of `rows` by `terms`, first term most significant.
pub fn sort_rows(rows: &mut [Row], terms: &[OrderTerm]) {
    rows.sort_by(|a, b| {
        terms
            .iter()
            .map(|term| term.compare(a, b))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

pub struct Orderer {
    group_by_fields: Vec<String>,
}

impl Orderer {
    /// `group_by_fields` are the non-date dimensions whose order the date anchor propagates.
    pub fn new(group_by_fields: &[String]) -> Self {
        Self {
            group_by_fields: group_by_fields
                .iter()
                .filter(|f| f.as_str() != DATE_FIELD)
                .cloned()
                .collect(),
        }
    }

    pub fn order(&self, mut rows: Vec<Row>, order_by: &[String]) -> Vec<Row> {
        let dates: HashSet<&str> = rows.iter().filter_map(row_date).collect();
        let anchor = order_by
            .iter()
            .map(|term| term.trim_start_matches('-'))
            .find(|term| dates.contains(term))
            .map(str::to_string);

        let schema: HashSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
        let mut terms = Vec::new();
        for term in order_by {
            let parsed = OrderTerm::parse(term);
            if Some(parsed.field.as_str()) == anchor.as_deref() {
                continue;
            }
            if !schema.contains(&parsed.field) {
                if !rows.is_empty() {
                    warn!(term = %term, "Dropping order term for a field absent from the report rows");
                }
                continue;
            }
            terms.push(parsed);
        }

        match anchor {
            Some(anchor) => self.order_by_anchor(rows, &anchor, &terms),
            None => {
                sort_rows(&mut rows, &terms);
                rows
            }
        }
    }

    fn order_by_anchor(&self, rows: Vec<Row>, anchor: &str, terms: &[OrderTerm]) -> Vec<Row> {
        debug!(anchor, terms = terms.len(), "Ordering by date anchor");

        let mut anchor_slice: Vec<Row> = rows
            .iter()
            .filter(|r| row_date(r) == Some(anchor))
            .cloned()
            .collect();
        sort_rows(&mut anchor_slice, terms);

        let mut key_order: Vec<GroupKey> = Vec::new();
        for row in &anchor_slice {
            let key = GroupKey::from_row(row, &self.group_by_fields);
            if !key_order.contains(&key) {
                key_order.push(key);
            }
        }

        // Groups absent from the anchor date come after, in their own term order.
        let mut remainder: Vec<Row> = rows
            .iter()
            .filter(|r| !key_order.contains(&GroupKey::from_row(r, &self.group_by_fields)))
            .cloned()
            .collect();
        sort_rows(&mut remainder, terms);
        for row in &remainder {
            let key = GroupKey::from_row(row, &self.group_by_fields);
            if !key_order.contains(&key) {
                key_order.push(key);
            }
        }

        let position: HashMap<GroupKey, usize> = key_order
            .into_iter()
            .enumerate()
            .map(|(i, key)| (key, i))
            .collect();
        let mut ordered = rows;
        ordered.sort_by_key(|r| position.get(&GroupKey::from_row(r, &self.group_by_fields)).copied());
        sort_rows(&mut ordered, &[OrderTerm::parse("-date")]);
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{row, Value};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn group(date: &str, account: &str, cost: Decimal) -> Row {
        row([
            ("date", Value::from(date)),
            ("account", Value::from(account)),
            ("cost_total", Value::from(cost)),
        ])
    }

    fn accounts(rows: &[Row]) -> Vec<String> {
        rows.iter().map(|r| r["account"].label()).collect()
    }

    fn terms(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_plain_multi_key_sort() {
        let rows = vec![
            group("2022-06-01", "A", dec!(1)),
            group("2022-06-02", "B", dec!(2)),
            group("2022-06-02", "C", dec!(7)),
            group("2022-06-01", "D", dec!(4)),
        ];
        let ordered = Orderer::new(&terms(&["account"])).order(rows, &terms(&["-date", "-cost_total"]));
        assert_eq!(accounts(&ordered), vec!["C", "B", "D", "A"]);
    }

    #[test]
    fn test_stable_on_ties() {
        let rows = vec![
            group("2022-06-01", "B", dec!(1)),
            group("2022-06-01", "A", dec!(1)),
        ];
        let ordered = Orderer::new(&terms(&["account"])).order(rows, &terms(&["-cost_total"]));
        assert_eq!(accounts(&ordered), vec!["B", "A"]);
    }

    #[test]
    fn test_unknown_term_is_dropped() {
        let rows = vec![
            group("2022-06-01", "A", dec!(1)),
            group("2022-06-01", "B", dec!(2)),
        ];
        let ordered = Orderer::new(&terms(&["account"])).order(rows, &terms(&["-bogus", "-cost_total"]));
        assert_eq!(accounts(&ordered), vec!["B", "A"]);
    }

    #[test]
    fn test_nulls_last() {
        let mut missing = group("2022-06-01", "Z", dec!(0));
        missing.remove("cost_total");
        let rows = vec![missing, group("2022-06-01", "A", dec!(1))];
        let asc = Orderer::new(&terms(&["account"])).order(rows.clone(), &terms(&["cost_total"]));
        let desc = Orderer::new(&terms(&["account"])).order(rows, &terms(&["-cost_total"]));
        assert_eq!(accounts(&asc), vec!["A", "Z"]);
        assert_eq!(accounts(&desc), vec!["A", "Z"]);
    }

    #[test]
    fn test_date_anchor_propagates_group_order() {
        let rows = vec![
            group("2022-06-01", "A", dec!(1)),
            group("2022-06-01", "B", dec!(3)),
            group("2022-06-01", "C", dec!(2)),
            group("2022-06-02", "A", dec!(9)),
            group("2022-06-02", "B", dec!(1)),
            group("2022-06-02", "C", dec!(5)),
        ];

        let ordered = Orderer::new(&terms(&["account"]))
            .order(rows, &terms(&["-date", "2022-06-01", "-cost_total"]));

        let dates: Vec<String> = ordered.iter().map(|r| r["date"].label()).collect();
        assert_eq!(dates[..3], ["2022-06-02", "2022-06-02", "2022-06-02"]);
        assert_eq!(accounts(&ordered), vec!["B", "C", "A", "B", "C", "A"]);
    }

    #[test]
    fn test_date_anchor_keeps_groups_missing_from_anchor() {
        let rows = vec![
            group("2022-06-01", "A", dec!(1)),
            group("2022-06-02", "A", dec!(1)),
            group("2022-06-02", "B", dec!(5)),
        ];
        let ordered = Orderer::new(&terms(&["account"])).order(rows, &terms(&["2022-06-01", "-cost_total"]));
        assert_eq!(ordered.len(), 3);
        assert_eq!(accounts(&ordered), vec!["A", "B", "A"]);
    }
}
