//! Packing of flat cost columns into the nested cost breakdown.
//!
//! A total row carries columns such as `infra_raw`, `sup_markup` or `cost_total` next to
//! `cost_units`. The response exposes them as
//! `{"infrastructure": {"raw": {"value": .., "units": ..}, ..}, "cost": {..}}`.

use crate::models::{Row, Value};
use serde::Serialize;
use std::collections::BTreeMap;

/// One flat column and where it lands in the packed structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackKey {
    pub field: String,
    pub key: String,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDefinition {
    pub name: String,
    pub keys: Vec<PackKey>,
    /// Column holding the unit of every key in this definition.
    pub units: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackDefinitions(pub Vec<PackDefinition>);

const COST_GROUPS: [(&str, &str); 3] = [
    ("infra", "infrastructure"),
    ("sup", "supplementary"),
    ("cost", "cost"),
];

impl PackDefinitions {
    pub fn standard() -> Self {
        Self::build(&["raw", "markup", "usage", "total"])
    }

    /// Cost groups with an extra `credit` key in each group.
    pub fn with_credit() -> Self {
        Self::build(&["raw", "markup", "usage", "credit", "total"])
    }

    fn build(cost_keys: &[&str]) -> Self {
        let cost_groups = COST_GROUPS
            .iter()
            .flat_map(|(prefix, group)| {
                cost_keys.iter().map(move |key| PackKey {
                    field: format!("{}_{}", prefix, key),
                    key: key.to_string(),
                    group: Some(group.to_string()),
                })
            })
            .collect();

        let plain = |name: &str| PackDefinition {
            name: name.to_string(),
            keys: vec![PackKey {
                field: name.to_string(),
                key: name.to_string(),
                group: None,
            }],
            units: format!("{}_units", name),
        };

        Self(vec![
            PackDefinition {
                name: "cost_groups".to_string(),
                keys: cost_groups,
                units: "cost_units".to_string(),
            },
            plain("usage"),
            plain("count"),
        ])
    }

    pub fn definition(&self, name: &str) -> Option<&PackDefinition> {
        self.0.iter().find(|d| d.name == name)
    }

    /// Fold the flat columns of `row` into the nested structure.
    pub fn pack(&self, row: &Row) -> PackedRow {
        let mut remaining = row.clone();
        let mut packed = PackedRow::new();

        for definition in &self.0 {
            let units = row.get(&definition.units).cloned().unwrap_or(Value::Null);
            let mut consumed = false;

            for pack_key in &definition.keys {
                let Some(value) = remaining.remove(&pack_key.field) else {
                    continue;
                };
                consumed = true;
                let amount = Amount {
                    value,
                    units: units.clone(),
                };
                match &pack_key.group {
                    Some(group) => {
                        if let Packed::Group(members) = packed
                            .entry(group.clone())
                            .or_insert_with(|| Packed::Group(BTreeMap::new()))
                        {
                            members.insert(pack_key.key.clone(), amount);
                        }
                    }
                    None => {
                        packed.insert(pack_key.key.clone(), Packed::Amount(amount));
                    }
                }
            }

            if consumed {
                remaining.remove(&definition.units);
            }
        }

        for (name, value) in remaining {
            packed.entry(name).or_insert(Packed::Scalar(value));
        }
        packed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amount {
    pub value: Value,
    pub units: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Packed {
    Scalar(Value),
    Amount(Amount),
    Group(BTreeMap<String, Amount>),
}

pub type PackedRow = BTreeMap<String, Packed>;
