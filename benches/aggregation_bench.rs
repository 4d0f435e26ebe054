//! Benchmarks for flight parsing and aggregation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use csv::StringRecord;
use flightstats::aggregate::{late_flights_by_airline, GroupAccumulator};
use flightstats::config::{IngestConfig, StoreConfig};
use flightstats::ingest::{parse_flight, IngestionLoader};
use flightstats::query::{DateRange, RangeQuery, RangeQueryPlanner};
use flightstats::store::{FlightRecord, FunctionCall, RecordStore, SqliteStore};
use flightstats::Aggregator;
use std::sync::Arc;
use tempfile::tempdir;

const CARRIERS: [&str; 6] = ["AA", "B6", "DL", "UA", "US", "WN"];

fn flight_line(i: usize) -> String {
    let day = i % 3 + 15;
    let actual_arr = 700 + (i % 60);
    format!(
        "{},2012,{},2012/01/{},19805,{},{},12478,JFK,New York,NY,LAX,Los Angeles,CA,540,720,360,330,2475,545,{}",
        i,
        day,
        day,
        CARRIERS[i % CARRIERS.len()],
        i % 900,
        actual_arr
    )
}

fn create_test_rows(count: usize) -> Vec<StringRecord> {
    (0..count)
        .map(|i| StringRecord::from(flight_line(i).split(',').collect::<Vec<_>>()))
        .collect()
}

fn create_test_flights(count: usize) -> Vec<FlightRecord> {
    create_test_rows(count)
        .iter()
        .map(|row| parse_flight(row).unwrap())
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for size in [100, 1000, 10000] {
        let rows = create_test_rows(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("parse_{}", size), |b| {
            b.iter(|| {
                for row in &rows {
                    black_box(parse_flight(black_box(row)).unwrap());
                }
            })
        });
    }

    group.finish();
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");
    let function = late_flights_by_airline(15);

    for size in [1000, 10000, 100000] {
        let flights = create_test_flights(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("map_reduce_{}", size), |b| {
            b.iter(|| {
                let mut acc = GroupAccumulator::new(function.reduce);
                for flight in &flights {
                    if let Some((key, contribution)) = function.map(black_box(flight)) {
                        acc.add(key, contribution);
                    }
                }
                acc.finalize()
            })
        });
    }

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("store");
    let rt = tokio::runtime::Runtime::new().unwrap();

    let dir = tempdir().unwrap();
    let store_config = StoreConfig {
        data_dir: dir.path().to_string_lossy().into_owned(),
        ..StoreConfig::default()
    };
    let store = Arc::new(SqliteStore::open(&store_config).unwrap());
    store.register_function(late_flights_by_airline(15)).unwrap();

    rt.block_on(async {
        let data: String = (0..5000).map(|i| flight_line(i) + "\n").collect();
        let loader = IngestionLoader::new(store.clone(), &store_config, IngestConfig::default());
        loader.prepare_index().await.unwrap();
        loader.load_str("bench", &data).await.unwrap();
    });

    let planner = RangeQueryPlanner::new(store.clone());
    let aggregator = Aggregator::new(late_flights_by_airline(15));
    let query = RangeQuery::new()
        .namespace(&store_config.namespace)
        .set_name(&store_config.set_name)
        .index("flight_date")
        .bin("fl_date")
        .dates(DateRange::parse("2012-01-15", "2012-01-16").unwrap());

    group.bench_function("aggregate_server_side", |b| {
        let query = query
            .clone()
            .aggregate(FunctionCall::new("simple_aggregation", "late_flights_by_airline"));
        b.iter(|| {
            rt.block_on(async {
                let handle = planner.execute(&query).await.unwrap();
                aggregator.run_aggregation(handle).await.unwrap()
            })
        })
    });

    group.bench_function("aggregate_client_side", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handle = planner.execute(black_box(&query)).await.unwrap();
                aggregator.run_aggregation(handle).await.unwrap()
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_fold, bench_store);
criterion_main!(benches);
