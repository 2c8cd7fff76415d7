use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use cost_report::config::Config;
use cost_report::currency::ExchangeRateTable;
use cost_report::dates::Resolution;
use cost_report::delta::DeltaSpec;
use cost_report::display::DisplayManager;
use cost_report::logging::init_logging;
use cost_report::provider_map::all_provider_maps;
use cost_report::query::{QueryParameters, ReportQueryHandler, CSV_ACCEPT_TYPE};
use cost_report::row_source::RowSource;
use std::process;
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "cost-report")]
#[command(about = "Multi-cloud cost report aggregation: grouping, ranking and currency normalization")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a report query over cost rows
    Report {
        /// Provider type (AWS, Azure, GCP, OCP, OCP-on-AWS, OCP-on-Azure, OCP-on-GCP, OCP-on-All)
        #[arg(long)]
        provider: String,
        /// Report type (costs, instance_type, storage, network, database, cpu, memory, volume)
        #[arg(long, default_value = "costs")]
        report_type: String,
        /// Glob pattern of .json / .jsonl row files
        #[arg(long)]
        rows: String,
        /// Group-by dimension, repeatable; and:/or: prefixes are accepted
        #[arg(long = "group-by")]
        group_by: Vec<String>,
        /// Order term, repeatable; prefix with - for descending, a date anchors the order
        #[arg(long = "order-by", allow_hyphen_values = true)]
        order_by: Vec<String>,
        /// Keep the top N groups per date and merge the rest into Others
        #[arg(long)]
        limit: Option<usize>,
        /// Target currency (defaults to the configured currency)
        #[arg(long)]
        currency: Option<String>,
        /// Measure compared against the previous period
        #[arg(long, requires = "previous_rows")]
        delta: Option<String>,
        /// Glob pattern of the previous period's row files
        #[arg(long, requires = "delta")]
        previous_rows: Option<String>,
        /// Date resolution (daily, monthly)
        #[arg(long, default_value = "daily")]
        resolution: String,
        /// Start of the query window (YYYY-MM-DD)
        #[arg(long, requires = "end_date")]
        start_date: Option<String>,
        /// End of the query window (YYYY-MM-DD)
        #[arg(long, requires = "start_date")]
        end_date: Option<String>,
        /// Output flat rows as CSV
        #[arg(long, conflicts_with = "json")]
        csv: bool,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// List providers with their report types and group-by options
    Providers {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the exchange-rate table
    Rates {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };
    let _log_guard = init_logging(&config.logging, &config.paths.log_directory);

    let json = match &cli.command {
        Commands::Report { json, .. }
        | Commands::Providers { json }
        | Commands::Rates { json } => *json,
    };

    if let Err(e) = run(cli.command, &config) {
        handle_error(e, json);
    }
}

fn run(command: Commands, config: &Config) -> Result<()> {
    let display = DisplayManager::new();

    match command {
        Commands::Report {
            provider,
            report_type,
            rows,
            group_by,
            order_by,
            limit,
            currency,
            delta,
            previous_rows,
            resolution,
            start_date,
            end_date,
            csv,
            json,
        } => {
            let source = RowSource::new();
            let mut params = QueryParameters::new(provider.parse()?, report_type.parse()?);
            params.group_by = group_by;
            params.order_by = order_by;
            params.limit = limit;
            params.currency = currency
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| config.report.default_currency.clone());
            params.resolution = resolution.parse::<Resolution>()?;
            params.decimal_places = config.report.decimal_places;
            if csv {
                params.accept_type = Some(CSV_ACCEPT_TYPE.to_string());
            }
            if let (Some(start), Some(end)) = (start_date, end_date) {
                params.time_interval = Some((parse_date(&start)?, parse_date(&end)?));
            }
            if let (Some(measure), Some(pattern)) = (delta, previous_rows) {
                let (previous, _) = source
                    .load(&pattern)
                    .context("Failed to load previous-period rows")?;
                params.delta = Some(DeltaSpec::new(&measure, previous));
            }

            let handler = ReportQueryHandler::new(params, load_rates(config)?)?;
            let (current, summary) = source.load(&rows)?;
            debug!(?summary, "Row files loaded");

            let response = handler.execute_query(current)?;
            display.display_report(&response, json, config.output.json_pretty)
        }
        Commands::Providers { json } => display.display_providers(&all_provider_maps()?, json),
        Commands::Rates { json } => display.display_rates(&*load_rates(config)?, json),
    }
}

fn load_rates(config: &Config) -> Result<Arc<ExchangeRateTable>> {
    let table = match &config.report.rates_file {
        Some(path) => ExchangeRateTable::load_from_file(path)?,
        None => ExchangeRateTable::canonical(),
    };
    Ok(Arc::new(table))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format: {}. Use YYYY-MM-DD", value))
}

fn handle_error(e: anyhow::Error, json: bool) -> ! {
    if json {
        println!("{}", serde_json::json!({ "error": format!("{:#}", e) }));
    } else {
        eprintln!("Error: {:#}", e);
    }
    process::exit(1);
}

