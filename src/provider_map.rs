//! Provider Map
//!
//! Static, per-provider configuration consumed by every stage of the report pipeline. A
//! [`ProviderMap`] answers: which dimensions may a query group by, which source columns feed
//! them, which measures exist and how they aggregate, which column carries the row currency,
//! and how the totals are packed.
//!
//! ## Composition
//!
//! Each cloud provider contributes one [`ProviderFields`] record. OpenShift-on-cloud providers
//! do not inherit from anything: their record is the OpenShift field set combined with the
//! cloud field set through [`ProviderFields::combine`], looked up by provider pair in
//! [`provider_fields`].
//!
//! Report types contribute the measure list and the unit fallbacks ([`ReportTypeMap`]).
//! Unsupported `(provider, report type)` combinations are configuration errors.

use crate::error::{ReportError, ReportResult};
use crate::pack::PackDefinitions;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderType {
    Aws,
    Azure,
    Gcp,
    Ocp,
    OcpAws,
    OcpAzure,
    OcpGcp,
    OcpAll,
}

impl ProviderType {
    pub const ALL: [ProviderType; 8] = [
        ProviderType::Aws,
        ProviderType::Azure,
        ProviderType::Gcp,
        ProviderType::Ocp,
        ProviderType::OcpAws,
        ProviderType::OcpAzure,
        ProviderType::OcpGcp,
        ProviderType::OcpAll,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Aws => "AWS",
            ProviderType::Azure => "Azure",
            ProviderType::Gcp => "GCP",
            ProviderType::Ocp => "OCP",
            ProviderType::OcpAws => "OCP-on-AWS",
            ProviderType::OcpAzure => "OCP-on-Azure",
            ProviderType::OcpGcp => "OCP-on-GCP",
            ProviderType::OcpAll => "OCP-on-All",
        }
    }

    /// OpenShift running on a cloud provider.
    pub fn is_ocp_on_cloud(&self) -> bool {
        matches!(
            self,
            ProviderType::OcpAws | ProviderType::OcpAzure | ProviderType::OcpGcp | ProviderType::OcpAll
        )
    }

    pub fn report_types(&self) -> &'static [ReportType] {
        use ReportType::*;
        match self {
            ProviderType::Aws | ProviderType::Azure | ProviderType::Gcp => {
                &[Costs, InstanceType, Storage, Network, Database]
            }
            ProviderType::Ocp => &[Costs, Cpu, Memory, Volume],
            _ => &[Costs, CostsByProject, InstanceType, Storage],
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_ascii_lowercase().replace('_', "-");
        ProviderType::ALL
            .into_iter()
            .find(|p| p.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ReportError::configuration(format!("Unknown provider type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportType {
    Costs,
    CostsByProject,
    InstanceType,
    Storage,
    Network,
    Database,
    Cpu,
    Memory,
    Volume,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Costs => "costs",
            ReportType::CostsByProject => "costs_by_project",
            ReportType::InstanceType => "instance_type",
            ReportType::Storage => "storage",
            ReportType::Network => "network",
            ReportType::Database => "database",
            ReportType::Cpu => "cpu",
            ReportType::Memory => "memory",
            ReportType::Volume => "volume",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ReportType::*;
        [Costs, CostsByProject, InstanceType, Storage, Network, Database, Cpu, Memory, Volume]
            .into_iter()
            .find(|r| r.as_str() == s.to_ascii_lowercase().replace('-', "_"))
            .ok_or_else(|| ReportError::configuration(format!("Unknown report type: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggRule {
    Sum,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measure {
    pub name: String,
    pub rule: AggRule,
}

impl Measure {
    pub fn new(name: &str, rule: AggRule) -> Self {
        Self {
            name: name.to_string(),
            rule,
        }
    }
}

/// Provider-specific field set: dimensions, source columns and the currency column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFields {
    pub group_by_options: Vec<String>,
    /// `(query parameter, source column)` copied onto every row.
    pub annotations: Vec<(String, String)>,
    /// Extra `(field, source column)` annotations applied only when grouping by the dimension.
    pub group_by_annotations: BTreeMap<String, Vec<(String, String)>>,
    pub cost_units_key: String,
    pub usage_units_key: Option<String>,
    /// Cost measures include a `credit` bucket.
    pub credits: bool,
}

impl ProviderFields {
    fn build(
        group_by: &[&str],
        annotations: &[(&str, &str)],
        group_by_annotations: &[(&str, &[(&str, &str)])],
        cost_units_key: &str,
        usage_units_key: Option<&str>,
        credits: bool,
    ) -> Self {
        Self {
            group_by_options: group_by.iter().map(|s| s.to_string()).collect(),
            annotations: annotations
                .iter()
                .map(|(p, s)| (p.to_string(), s.to_string()))
                .collect(),
            group_by_annotations: group_by_annotations
                .iter()
                .map(|(dim, fields)| {
                    let fields = fields
                        .iter()
                        .map(|(f, s)| (f.to_string(), s.to_string()))
                        .collect();
                    (dim.to_string(), fields)
                })
                .collect(),
            cost_units_key: cost_units_key.to_string(),
            usage_units_key: usage_units_key.map(str::to_string),
            credits,
        }
    }

    /// OpenShift field set layered over a cloud field set. Cloud currency and usage
    /// unit columns win; dimensions and annotations are the union, OpenShift first.
    pub fn combine(ocp: &ProviderFields, cloud: &ProviderFields) -> Self {
        let mut group_by_options = ocp.group_by_options.clone();
        for option in &cloud.group_by_options {
            if !group_by_options.contains(option) {
                group_by_options.push(option.clone());
            }
        }

        let mut annotations = ocp.annotations.clone();
        for (param, source) in &cloud.annotations {
            if !annotations.iter().any(|(p, _)| p == param) {
                annotations.push((param.clone(), source.clone()));
            }
        }

        let mut group_by_annotations = cloud.group_by_annotations.clone();
        group_by_annotations.extend(ocp.group_by_annotations.clone());

        Self {
            group_by_options,
            annotations,
            group_by_annotations,
            cost_units_key: cloud.cost_units_key.clone(),
            usage_units_key: cloud.usage_units_key.clone(),
            credits: false,
        }
    }
}

fn aws_fields() -> ProviderFields {
    ProviderFields::build(
        &["account", "service", "region", "az", "product_family", "instance_type", "storage_type"],
        &[
            ("account", "usage_account_id"),
            ("service", "product_code"),
            ("az", "availability_zone"),
        ],
        &[("account", &[("account_alias", "account_alias")])],
        "currency_code",
        Some("unit"),
        false,
    )
}

fn azure_fields() -> ProviderFields {
    ProviderFields::build(
        &["subscription_guid", "resource_location", "instance_type", "service_name"],
        &[],
        &[],
        "currency",
        Some("unit_of_measure"),
        false,
    )
}

fn gcp_fields() -> ProviderFields {
    ProviderFields::build(
        &["account", "region", "service", "gcp_project", "instance_type"],
        &[
            ("account", "account_id"),
            ("service", "service_id"),
            ("gcp_project", "project_id"),
        ],
        &[
            ("service", &[("service_alias", "service_alias")]),
            ("gcp_project", &[("gcp_project_alias", "project_name")]),
        ],
        "currency",
        Some("unit"),
        true,
    )
}

fn ocp_fields() -> ProviderFields {
    ProviderFields::build(
        &["cluster", "node", "project"],
        &[("project", "namespace")],
        &[("cluster", &[("cluster_alias", "cluster_alias")])],
        "raw_currency",
        None,
        false,
    )
}

fn ocp_all_cloud_fields() -> ProviderFields {
    ProviderFields::build(
        &["account", "service", "region", "product_family", "source_type"],
        &[("account", "usage_account_id"), ("service", "product_code")],
        &[("account", &[("account_alias", "account_alias")])],
        "currency_code",
        Some("unit"),
        false,
    )
}

/// Field set for a provider, composing OpenShift-on-cloud pairs.
pub fn provider_fields(provider: ProviderType) -> ProviderFields {
    match provider {
        ProviderType::Aws => aws_fields(),
        ProviderType::Azure => azure_fields(),
        ProviderType::Gcp => gcp_fields(),
        ProviderType::Ocp => ocp_fields(),
        ProviderType::OcpAws => ProviderFields::combine(&ocp_fields(), &aws_fields()),
        ProviderType::OcpAzure => ProviderFields::combine(&ocp_fields(), &azure_fields()),
        ProviderType::OcpGcp => ProviderFields::combine(&ocp_fields(), &gcp_fields()),
        ProviderType::OcpAll => ProviderFields::combine(&ocp_fields(), &ocp_all_cloud_fields()),
    }
}

/// Measures, unit fallbacks and default ordering of one report type.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTypeMap {
    pub measures: Vec<Measure>,
    pub cost_units_fallback: String,
    pub usage_units_fallback: Option<String>,
    pub count_units_fallback: Option<String>,
    /// Measure used for the implicit `-<measure>` ordering.
    pub default_ordering: String,
    /// Non-numeric columns carried through aggregation untouched.
    pub skip_columns: Vec<String>,
}

fn cost_measures(credits: bool) -> Vec<Measure> {
    let mut keys = vec!["raw", "usage", "markup"];
    if credits {
        keys.push("credit");
    }
    keys.push("total");

    ["infra", "sup", "cost"]
        .iter()
        .flat_map(|group| {
            keys.iter().map(move |key| {
                Measure::new(&format!("{}_{}", group, key), AggRule::Sum)
            })
        })
        .collect()
}

fn report_type_map(provider: ProviderType, report_type: ReportType, credits: bool) -> ReportTypeMap {
    let mut measures = cost_measures(credits);
    let mut usage_units_fallback = None;
    let mut count_units_fallback = None;
    let mut default_ordering = "cost_total";

    let usage = |unit: &str| (Measure::new("usage", AggRule::Sum), Some(unit.to_string()));
    match report_type {
        ReportType::Costs | ReportType::CostsByProject => {}
        ReportType::InstanceType => {
            let (m, fallback) = usage("Hrs");
            measures.push(m);
            measures.push(Measure::new("count", AggRule::Sum));
            usage_units_fallback = fallback;
            count_units_fallback = Some("instances".to_string());
            default_ordering = "usage";
        }
        ReportType::Storage | ReportType::Database => {
            let (m, fallback) = usage("GB-Mo");
            measures.push(m);
            usage_units_fallback = fallback;
            default_ordering = "usage";
        }
        ReportType::Network => {
            let (m, fallback) = usage("GB");
            measures.push(m);
            usage_units_fallback = fallback;
            default_ordering = "usage";
        }
        ReportType::Cpu | ReportType::Memory => {
            let unit = if report_type == ReportType::Cpu { "Core-Hours" } else { "GB-Hours" };
            let (m, fallback) = usage(unit);
            measures.push(m);
            measures.push(Measure::new("request", AggRule::Sum));
            measures.push(Measure::new("limit", AggRule::Sum));
            measures.push(Measure::new("capacity", AggRule::Max));
            usage_units_fallback = fallback;
            default_ordering = "usage";
        }
        ReportType::Volume => {
            let (m, fallback) = usage("GB-Mo");
            measures.push(m);
            measures.push(Measure::new("request", AggRule::Sum));
            usage_units_fallback = fallback;
            default_ordering = "usage";
        }
    }

    let mut skip_columns = vec!["source_uuid".to_string()];
    if provider.is_ocp_on_cloud() || provider == ProviderType::Ocp {
        skip_columns.push("clusters".to_string());
    }

    ReportTypeMap {
        measures,
        cost_units_fallback: "USD".to_string(),
        usage_units_fallback,
        count_units_fallback,
        default_ordering: default_ordering.to_string(),
        skip_columns,
    }
}

/// Complete configuration bundle for one `(provider, report type)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMap {
    pub provider: ProviderType,
    pub report_type: ReportType,
    pub fields: ProviderFields,
    pub report_type_map: ReportTypeMap,
    pub pack_definitions: PackDefinitions,
}

impl ProviderMap {
    pub fn new(provider: ProviderType, report_type: ReportType) -> ReportResult<Self> {
        if !provider.report_types().contains(&report_type) {
            return Err(ReportError::configuration(format!(
                "Report type {} is not available for provider {}",
                report_type, provider
            )));
        }

        let fields = provider_fields(provider);
        let report_type_map = report_type_map(provider, report_type, fields.credits);
        let pack_definitions = if fields.credits {
            PackDefinitions::with_credit()
        } else {
            PackDefinitions::standard()
        };

        Ok(Self {
            provider,
            report_type,
            fields,
            report_type_map,
            pack_definitions,
        })
    }

    pub fn group_by_options(&self) -> &[String] {
        &self.fields.group_by_options
    }

    pub fn measures(&self) -> &[Measure] {
        &self.report_type_map.measures
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures().iter().find(|m| m.name == name)
    }

    pub fn cost_units_key(&self) -> &str {
        &self.fields.cost_units_key
    }

    /// Whether rows of this report carry a usage unit.
    pub fn has_usage_units(&self) -> bool {
        self.report_type_map.usage_units_fallback.is_some()
    }

    pub fn has_count_units(&self) -> bool {
        self.report_type_map.count_units_fallback.is_some()
    }

    pub fn validate_group_by(&self, group_by: &[String]) -> ReportResult<()> {
        for dimension in group_by {
            if !self.group_by_options().contains(dimension) {
                return Err(ReportError::configuration(format!(
                    "Cannot group {} {} reports by {}; allowed: {}",
                    self.provider,
                    self.report_type,
                    dimension,
                    self.group_by_options().join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Annotations applied for a query grouped by `group_by`.
    pub fn annotations_for(&self, group_by: &[String]) -> Vec<(String, String)> {
        let mut annotations = self.fields.annotations.clone();
        for dimension in group_by {
            if let Some(extra) = self.fields.group_by_annotations.get(dimension) {
                annotations.extend(extra.iter().cloned());
            }
        }
        annotations
    }

    /// Alias columns attached to a dimension, e.g. `account_alias` for `account`.
    pub fn alias_fields(&self, dimension: &str) -> Vec<String> {
        self.fields
            .group_by_annotations
            .get(dimension)
            .map(|fields| fields.iter().map(|(f, _)| f.clone()).collect())
            .unwrap_or_default()
    }

    /// Non-measure columns kept on grouped rows.
    pub fn retained_columns(&self, group_by: &[String]) -> Vec<String> {
        let mut columns: Vec<String> = group_by.iter().flat_map(|d| self.alias_fields(d)).collect();
        columns.extend(self.report_type_map.skip_columns.iter().cloned());
        if self.has_usage_units() {
            columns.push("usage_units".to_string());
        }
        if self.has_count_units() {
            columns.push("count_units".to_string());
        }
        columns
    }
}

/// Report type actually served: OpenShift-on-cloud cost queries grouped by project read
/// project-level cost columns.
pub fn effective_report_type(
    provider: ProviderType,
    report_type: ReportType,
    group_by: &[String],
) -> ReportType {
    if provider.is_ocp_on_cloud()
        && report_type == ReportType::Costs
        && group_by.iter().any(|g| g == "project")
    {
        ReportType::CostsByProject
    } else {
        report_type
    }
}

/// Every supported `(provider, report type)` configuration, for listing and startup checks.
pub fn all_provider_maps() -> ReportResult<Vec<ProviderMap>> {
    let mut maps = Vec::new();
    for provider in ProviderType::ALL {
        for report_type in provider.report_types() {
            maps.push(ProviderMap::new(provider, *report_type)?);
        }
    }
    Ok(maps)
}
