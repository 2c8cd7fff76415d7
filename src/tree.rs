//! Nesting of ordered rows into the response tree.
//!
//! [`build_tree`] groups rows by each group-by dimension in turn. A node is created the first
//! time its value appears at its level and later rows with the same value join it, so node
//! order is first-appearance order and rows keep their incoming order inside each node. The
//! builder never sorts; ordering is entirely the orderer's job.

use crate::models::{field, plural, Row, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub dimension: String,
    pub key: Value,
    /// Alias columns of this dimension taken from the first row of the node.
    pub attributes: Vec<(String, Value)>,
    pub children: TreeLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeLevel {
    Groups(Vec<GroupNode>),
    Values(Vec<Row>),
}

impl GroupNode {
    /// Leaf rows under this node, depth-first.
    pub fn rows(&self) -> Vec<&Row> {
        match &self.children {
            TreeLevel::Values(rows) => rows.iter().collect(),
            TreeLevel::Groups(groups) => groups.iter().flat_map(GroupNode::rows).collect(),
        }
    }
}

/// Nest `rows` by `group_by_fields`. `alias_fields` names the attribute columns of a dimension.
pub fn build_tree<F>(rows: Vec<Row>, group_by_fields: &[String], alias_fields: &F) -> Vec<GroupNode>
where
    F: Fn(&str) -> Vec<String>,
{
    let Some((dimension, rest)) = group_by_fields.split_first() else {
        return Vec::new();
    };

    let mut buckets: Vec<(Value, Vec<Row>)> = Vec::new();
    for row in rows {
        let key = field(&row, dimension).clone();
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => buckets.push((key, vec![row])),
        }
    }

    let aliases = alias_fields(dimension);
    buckets
        .into_iter()
        .map(|(key, members)| {
            let attributes = aliases
                .iter()
                .filter_map(|alias| members[0].get(alias).map(|v| (alias.clone(), v.clone())))
                .collect();
            let children = if rest.is_empty() {
                TreeLevel::Values(members)
            } else {
                TreeLevel::Groups(build_tree(members, rest, alias_fields))
            };
            GroupNode {
                dimension: dimension.clone(),
                key,
                attributes,
                children,
            }
        })
        .collect()
}

/// Rows of a tree, depth-first. Inverse of [`build_tree`] for input grouped by key prefix.
pub fn flatten(nodes: &[GroupNode]) -> Vec<Row> {
    nodes
        .iter()
        .flat_map(|node| node.rows().into_iter().cloned())
        .collect()
}

impl Serialize for GroupNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.attributes.len()))?;
        map.serialize_entry(&self.dimension, &self.key)?;
        for (name, value) in &self.attributes {
            map.serialize_entry(name, value)?;
        }
        match &self.children {
            TreeLevel::Values(rows) => map.serialize_entry("values", rows)?,
            TreeLevel::Groups(groups) => {
                let child_dimension = groups
                    .first()
                    .map(|g| plural(&g.dimension))
                    .unwrap_or_else(|| "values".to_string());
                map.serialize_entry(&child_dimension, groups)?
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::row;
    use rust_decimal_macros::dec;

    fn no_alias(_: &str) -> Vec<String> {
        Vec::new()
    }

    fn line(account: &str, service: &str, cost: i64) -> Row {
        row([
            ("account", Value::from(account)),
            ("service", Value::from(service)),
            ("cost_total", Value::from(cost)),
        ])
    }

    fn dims() -> Vec<String> {
        vec!["account".to_string(), "service".to_string()]
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let rows = vec![
            line("B", "S3", 9),
            line("B", "EC2", 4),
            line("A", "EC2", 7),
            line("C", "RDS", 1),
        ];
        let tree = build_tree(rows.clone(), &dims(), &no_alias);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree[0].key, Value::from("B"));
        assert_eq!(flatten(&tree), rows);
    }

    #[test]
    fn test_merges_non_adjacent_keys_into_first_node() {
        let rows = vec![line("A", "EC2", 1), line("B", "EC2", 2), line("A", "S3", 3)];
        let tree = build_tree(rows, &dims(), &no_alias);

        assert_eq!(tree.len(), 2);
        let TreeLevel::Groups(services) = &tree[0].children else {
            panic!("expected nested services");
        };
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].key, Value::from("S3"));
    }

    #[test]
    fn test_alias_attributes_and_serialization() {
        let mut first = line("A", "EC2", 1);
        first.insert("account_alias".into(), Value::from("prod"));
        let alias = |dim: &str| {
            if dim == "account" {
                vec!["account_alias".to_string()]
            } else {
                Vec::new()
            }
        };
        let tree = build_tree(vec![first], &dims(), &alias);
        assert_eq!(tree[0].attributes, vec![("account_alias".to_string(), Value::from("prod"))]);

        let json = serde_json::to_value(&tree[0]).unwrap();
        assert_eq!(json["account"], "A");
        assert_eq!(json["account_alias"], "prod");
        assert_eq!(json["services"][0]["service"], "EC2");
        assert_eq!(json["services"][0]["values"][0]["cost_total"], dec!(1).to_string());
    }

    #[test]
    fn test_no_dimensions() {
        assert!(build_tree(vec![line("A", "EC2", 1)], &[], &no_alias).is_empty());
    }
}
