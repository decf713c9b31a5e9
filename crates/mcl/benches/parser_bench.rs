//! 🏎️ How fast can one thread turn TSV lines into protobuf bytes?
//!
//! The reader thread is the one stage that never parallelizes, so this is the ceiling.
//!
//! ```bash
//! cargo bench -p mcl --bench parser_bench
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use mcl::{UserApps, parse_line};

fn line_with_apps(app_count: usize) -> String {
    let apps: Vec<String> = (0..app_count).map(|app| (app * 7 + 1000).to_string()).collect();
    format!("idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t{}", apps.join(","))
}

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");
    for app_count in [1, 16, 256] {
        let line = line_with_apps(app_count);
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(app_count), &line, |b, line| {
            b.iter(|| parse_line(black_box(line)))
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_payload");
    for app_count in [1, 16, 256] {
        let message = UserApps {
            apps: (0..app_count as u32).collect(),
            lat: Some(55.55),
            lon: Some(42.42),
        };
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(app_count), &message, |b, message| {
            b.iter(|| black_box(message).encode_payload())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_line, bench_encode);
criterion_main!(benches);
