//! Core Data Models
//!
//! This module defines the data structures that flow through the report pipeline, from the
//! annotated rows handed over by the storage layer to the response consumed by the view layer.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`Row`] - One cost/usage observation, a map of field name to [`Value`]
//! 2. **Grouping**: [`GroupKey`] - Ordered tuple of group-by values identifying one bucket
//! 3. **Totals**: [`Total`] - Currency-normalized aggregate over the whole dataset
//! 4. **Output**: [`ReportResponse`] - Nested tree (or flat rows), total and optional delta
//!
//! ## Values
//!
//! Rows are loosely typed on purpose: the set of columns depends on the provider and report
//! type. Monetary and usage amounts are [`rust_decimal::Decimal`] so that sums across
//! thousands of line items stay exact. Dates are stored in their truncated text form
//! (`YYYY-MM-DD` or `YYYY-MM`), which sorts chronologically as plain text.

use crate::pack::PackedRow;
use crate::tree::GroupNode;
use rust_decimal::Decimal;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Field name carrying the truncated date of a row.
pub const DATE_FIELD: &str = "date";
/// Field name carrying the 1-based rank assigned by the ranker.
pub const RANK_FIELD: &str = "rank";
/// Marker written into every dimension of the overflow bucket.
pub const OTHERS: &str = "Others";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Decimal(Decimal),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human-readable label used for tree keys and terminal output.
    pub fn label(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Text(s) => s.clone(),
            Value::List(items) => items.join(","),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Decimal(_) => 1,
            Value::Text(_) => 2,
            Value::List(_) => 3,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Decimal(d) => Serialize::serialize(d, serializer),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Decimal(Decimal::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

/// One cost/usage observation after provider-specific annotation.
pub type Row = BTreeMap<String, Value>;

/// Build a [`Row`] from `(field, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Read a field, treating an absent field as [`Value::Null`].
pub fn field<'a>(row: &'a Row, name: &str) -> &'a Value {
    static NULL: Value = Value::Null;
    row.get(name).unwrap_or(&NULL)
}

/// Date of a row as text, if present.
pub fn row_date(row: &Row) -> Option<&str> {
    row.get(DATE_FIELD).and_then(Value::as_text)
}

/// Ordered tuple of group-by dimension values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(pub Vec<Value>);

impl GroupKey {
    pub fn from_row(row: &Row, fields: &[String]) -> Self {
        Self(fields.iter().map(|f| field(row, f).clone()).collect())
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

/// Grand total across the filtered, currency-normalized dataset.
#[derive(Debug, Clone)]
pub struct Total {
    /// Flat measures and unit annotations.
    pub values: Row,
    /// The same values folded into the nested cost structure.
    pub packed: PackedRow,
}

impl Total {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn decimal(&self, name: &str) -> Decimal {
        self.values
            .get(name)
            .and_then(Value::as_decimal)
            .unwrap_or(Decimal::ZERO)
    }
}

impl Serialize for Total {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.packed.serialize(serializer)
    }
}

/// All grouped rows of one date, nested by the group-by dimensions.
#[derive(Debug, Clone)]
pub struct DateBucket {
    pub date: String,
    /// Dimension name of the first nesting level, `None` for a query without group-by.
    pub dimension: Option<String>,
    pub groups: Vec<GroupNode>,
    /// Rows of a query without group-by.
    pub values: Vec<Row>,
}

impl Serialize for DateBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(DATE_FIELD, &self.date)?;
        match &self.dimension {
            Some(dimension) => map.serialize_entry(&plural(dimension), &self.groups)?,
            None => map.serialize_entry("values", &self.values)?,
        }
        map.end()
    }
}

/// Plural label used for a dimension's list in the nested response.
pub fn plural(dimension: &str) -> String {
    format!("{}s", dimension)
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ReportData {
    Tree(Vec<DateBucket>),
    Flat(Vec<Row>),
}

impl ReportData {
    pub fn is_empty(&self) -> bool {
        match self {
            ReportData::Tree(buckets) => buckets.is_empty(),
            ReportData::Flat(rows) => rows.is_empty(),
        }
    }
}

/// Change of the delta measure against the previous period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub value: Decimal,
    pub percent: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub currency: String,
    pub data: ReportData,
    pub total: Total,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_value_ordering() {
        assert!(Value::Null < Value::from(dec!(1)));
        assert!(Value::from(dec!(2)) < Value::from(dec!(10)));
        assert!(Value::from("a") < Value::from("b"));
        assert_eq!(Value::from(dec!(1.0)), Value::from(dec!(1.00)));
    }

    #[test]
    fn test_group_key_from_row() {
        let r = row([("account", Value::from("A")), ("service", Value::from("EC2"))]);
        let key = GroupKey::from_row(&r, &["account".to_string(), "region".to_string()]);
        assert_eq!(key.values(), &[Value::from("A"), Value::Null]);
    }

    #[test]
    fn test_value_label() {
        assert_eq!(Value::from(dec!(5.3500)).label(), "5.35");
        assert_eq!(Value::List(vec!["a".into(), "b".into()]).label(), "a,b");
        assert_eq!(Value::Null.label(), "");
    }
}
