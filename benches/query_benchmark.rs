use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ffdb::core::config::Config;
use ffdb::core::database::FFDatabase;
use ffdb::core::types::FieldValue;
use ffdb::schema::{Record, SchemaRegistry};
use ffdb::storage::FlatFileWriter;
use rand::Rng;
use tempfile::TempDir;

const DAY: f64 = 86400.0;
const JAN_05: f64 = 1073260800.0;

/// Helper to build a record from (column, value) pairs
fn make_record(registry: &SchemaRegistry, table: &str, fields: Vec<(&str, FieldValue)>) -> Record {
    let mut record = Record::new(registry.get(table).unwrap());
    for (name, value) in fields {
        record.set_by_name(name, value).unwrap();
    }
    record
}

/// `days` daily partitions of origins, assocs and arrivals
fn build_tree(days: usize, per_day: usize) -> (TempDir, FFDatabase) {
    let dir = TempDir::new().unwrap();
    let param = dir.path().join("param");
    std::fs::create_dir_all(&param).unwrap();
    let config = Config::new(&param).with_dir_structure("%Y/%m/%d", DAY).with_author("idc");
    let db = FFDatabase::open(config).unwrap();
    let registry = SchemaRegistry::builtin();
    let mut rng = rand::thread_rng();

    let stations = ["ANMO", "KONO", "TSUM", "FIA0", "ARCES"];
    for day in 0..days {
        let base = JAN_05 + day as f64 * DAY;
        let partition = db.partition_dir("idc", base).unwrap();
        let mut origins = Vec::new();
        let mut assocs = Vec::new();
        let mut arrivals = Vec::new();
        for i in 0..per_day {
            let orid = (day * per_day + i) as i64;
            let t = base + rng.gen_range(0.0..DAY - 1000.0);
            origins.push(make_record(&registry, "origin", vec![
                ("orid", FieldValue::Integer(orid)),
                ("time", FieldValue::Time(t)),
                ("lat", FieldValue::Number(rng.gen_range(-90.0..90.0))),
            ]));
            for k in 0..3 {
                let arid = orid * 3 + k;
                let sta = stations[rng.gen_range(0..stations.len())];
                assocs.push(make_record(&registry, "assoc", vec![
                    ("arid", FieldValue::Integer(arid)),
                    ("orid", FieldValue::Integer(orid)),
                    ("sta", FieldValue::Text(sta.to_string())),
                ]));
                arrivals.push(make_record(&registry, "arrival", vec![
                    ("arid", FieldValue::Integer(arid)),
                    ("sta", FieldValue::Text(sta.to_string())),
                    ("time", FieldValue::Time(t + rng.gen_range(10.0..900.0))),
                ]));
            }
        }
        FlatFileWriter::append(&partition, "ev", &origins).unwrap();
        FlatFileWriter::append(&partition, "ev", &assocs).unwrap();
        FlatFileWriter::append(&partition, "ev", &arrivals).unwrap();
    }
    (dir, db)
}

/// Benchmark parsing and resolution
fn bench_resolve(c: &mut Criterion) {
    let (_dir, db) = build_tree(1, 1);
    let query = "select o.* from idc.origin o, assoc s, arrival a \
                 where s.orid = o.orid and a.arid = s.arid and a.time <= o.time + 600 \
                 and o.time between '2004/01/05' and '2004/01/20'";
    c.bench_function("resolve_three_tables", |b| {
        b.iter(|| db.resolve(black_box(query)).unwrap());
    });
}

/// Benchmark a single-table window scan with and without pruning
fn bench_window_scan(c: &mut Criterion) {
    let (_dir, db) = build_tree(30, 200);
    let mut group = c.benchmark_group("window_scan");

    group.bench_function("one_day_of_thirty", |b| {
        b.iter(|| {
            db.query_all(black_box("select * from origin where time between '2004/01/10' and '2004/01/11'"), 500)
                .unwrap()
        });
    });
    group.bench_function("all_thirty_days", |b| {
        b.iter(|| db.query_all(black_box("select * from origin"), 500).unwrap());
    });
    group.finish();
}

/// Benchmark fetch batch sizes over the same result set
fn bench_fetch_batches(c: &mut Criterion) {
    let (_dir, db) = build_tree(10, 200);
    let mut group = c.benchmark_group("fetch_batch");

    for batch in [1, 16, 256, 4096].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| db.query_all("select * from origin", batch).unwrap().len());
        });
    }
    group.finish();
}

/// Benchmark the nested-loop join
fn bench_join(c: &mut Criterion) {
    let (_dir, db) = build_tree(3, 100);
    c.bench_function("three_table_join", |b| {
        b.iter(|| {
            db.query_all(
                black_box("select o.* from origin o, assoc s, arrival a where s.orid = o.orid and a.arid = s.arid"),
                1000,
            )
            .unwrap()
        });
    });
}

criterion_group!(benches, bench_resolve, bench_window_scan, bench_fetch_batches, bench_join);
criterion_main!(benches);
