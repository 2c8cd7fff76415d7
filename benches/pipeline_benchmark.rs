//! Performance benchmarks for the report pipeline
//!
//! Run with: cargo bench

use cost_report::models::{row, Row, Value};
use cost_report::provider_map::{ProviderType, ReportType};
use cost_report::{ExchangeRateTable, QueryParameters, ReportQueryHandler};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Generate AWS line items spread over 30 days, 50 accounts and two currencies
fn generate_rows(num_rows: usize) -> Vec<Row> {
    (0..num_rows)
        .map(|i| {
            row([
                ("usage_start", Value::from(format!("2024-01-{:02}", i % 30 + 1))),
                ("usage_account_id", Value::from(format!("acct-{}", i % 50))),
                ("product_code", Value::from(if i % 2 == 0 { "AmazonEC2" } else { "AmazonS3" })),
                ("cost_total", Value::from(Decimal::new(i as i64 * 37 % 10_000, 2))),
                ("currency_code", Value::from(if i % 5 == 0 { "EUR" } else { "USD" })),
            ])
        })
        .collect()
}

fn handler(limit: Option<usize>) -> ReportQueryHandler {
    let mut params = QueryParameters::new(ProviderType::Aws, ReportType::Costs);
    params.group_by = vec!["account".to_string(), "service".to_string()];
    params.limit = limit;
    ReportQueryHandler::new(params, Arc::new(ExchangeRateTable::canonical())).unwrap()
}

fn benchmark_execute_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_query");

    for size in [100, 1000, 10000].iter() {
        let rows = generate_rows(*size);

        group.bench_with_input(BenchmarkId::new("grouped", size), size, |b, _| {
            let handler = handler(None);
            b.iter(|| handler.execute_query(black_box(rows.clone())))
        });

        group.bench_with_input(BenchmarkId::new("top_10", size), size, |b, _| {
            let handler = handler(Some(10));
            b.iter(|| handler.execute_query(black_box(rows.clone())))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_execute_query);
criterion_main!(benches);
