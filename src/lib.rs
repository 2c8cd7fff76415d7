//! Cost Report Library
//!
//! A Rust library for turning filtered multi-cloud cost and usage line items into grouped,
//! ranked, currency-normalized report responses. It covers AWS, Azure, GCP, OpenShift and
//! OpenShift running on those clouds.
//!
//! ## Core Features
//!
//! - **Provider configuration**: Static per-provider field sets, measures and unit fallbacks,
//!   composed for OpenShift-on-cloud pairs
//! - **Currency normalization**: Two-phase aggregation that sums per source currency before
//!   converting with an injected, read-only exchange-rate table
//! - **Top-N ranking**: Per-date ranking with an `Others` bucket collecting the overflow
//! - **Date-anchored ordering**: The group order of one date applied to every date
//! - **Nested responses**: Rows nested by group-by dimension inside per-date buckets, or flat
//!   rows for CSV
//! - **Period deltas**: Comparison of every group and of the total with a previous period
//!
//! ## Architecture Overview
//!
//! The library is organized around several key modules:
//!
//! - [`provider_map`] - Provider and report type configuration
//! - [`currency`] - Exchange-rate table and conversion of cost measures
//! - [`annotate`] - Row annotation ahead of aggregation
//! - [`aggregator`] - Two-phase grouping and grand total
//! - [`ranker`] - Top-N plus `Others`
//! - [`orderer`] - Multi-key ordering with the date-anchor rule
//! - [`tree`] - Nesting of ordered rows
//! - [`pack`] - Nested cost structure of the total
//! - [`delta`] - Previous-period comparison
//! - [`query`] - Query parameters and the pipeline orchestrator
//! - [`row_source`] - JSON / JSON-lines row loading
//! - [`display`] - Terminal, JSON and CSV output
//! - [`config`] - Configuration management with environment variable support
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```rust
//! use cost_report::models::{row, Value};
//! use cost_report::{ExchangeRateTable, ProviderType, QueryParameters, ReportQueryHandler, ReportType};
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut params = QueryParameters::new(ProviderType::Aws, ReportType::Costs);
//! params.group_by = vec!["account".to_string()];
//!
//! let handler = ReportQueryHandler::new(params, Arc::new(ExchangeRateTable::canonical()))?;
//! let response = handler.execute_query(vec![row([
//!     ("usage_start", Value::from("2022-06-01")),
//!     ("usage_account_id", Value::from("1234")),
//!     ("cost_total", Value::from("10")),
//!     ("currency_code", Value::from("USD")),
//! ])])?;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Types
//!
//! - [`Row`] / [`Value`] - One loosely typed line item
//! - [`QueryParameters`] - Validated query inputs
//! - [`ReportResponse`] - Nested data, packed total and optional delta
//! - [`ReportError`] - Configuration, conversion and row errors

pub mod aggregator;
pub mod annotate;
pub mod config;
pub mod currency;
pub mod dates;
pub mod delta;
pub mod display;
pub mod error;
pub mod logging;
pub mod models;
pub mod orderer;
pub mod pack;
pub mod provider_map;
pub mod query;
pub mod ranker;
pub mod row_source;
pub mod tree;

pub use currency::{CurrencyConverter, ExchangeRateTable};
pub use error::{ReportError, ReportResult};
pub use models::{ReportData, ReportResponse, Row, Value};
pub use provider_map::{ProviderMap, ProviderType, ReportType};
pub use query::{QueryParameters, ReportQueryHandler};
