use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use people_etl::pipeline::run_records;
use people_etl::record::{AGE_FIELD, CITY_FIELD, NAME_FIELD, RawRecord};
use people_etl::store::Store;
use people_etl::transform::transform_batch;

fn generate_people(rows: usize) -> Vec<RawRecord> {
    const CITIES: [&str; 4] = ["san luis", " SAN JUAN", "querétaro ", "León"];
    (0..rows)
        .map(|i| {
            let age = if i % 7 == 0 {
                "error".to_string()
            } else {
                (18 + i % 60).to_string()
            };
            RawRecord::from_pairs([
                (NAME_FIELD, format!("  PERSON {i} ")),
                (AGE_FIELD, age),
                (CITY_FIELD, CITIES[i % CITIES.len()].to_string()),
            ])
        })
        .collect()
}

fn bench_transform(c: &mut Criterion) {
    let records = generate_people(10_000);
    c.bench_function("transform_10k", |b| {
        b.iter(|| transform_batch(&records, 25));
    });
}

fn bench_load(c: &mut Criterion) {
    let records = generate_people(2_000);
    c.bench_function("load_2k_in_memory", |b| {
        b.iter_batched(
            || Store::open_in_memory().expect("in-memory store"),
            |mut store| run_records(&mut store, "bench.csv", &records, 25).expect("load"),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_transform, bench_load);
criterion_main!(benches);
