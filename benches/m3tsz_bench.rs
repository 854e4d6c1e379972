use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use m3tsz::{DataPoint, Decoder, Encoder, Options, ReaderIterator, TimeUnit};

const START: i64 = 1_609_459_200_000_000_000;
const MINUTE: i64 = 60_000_000_000;

/// Constant 60s interval, slowly varying values with no short decimal form.
fn generate_float_data(n: usize) -> Vec<DataPoint> {
    (0..n)
        .map(|i| {
            let v = 20.0 + 5.0 * ((i as f64) * 0.01).sin() + (i as f64) * 0.001;
            DataPoint::new(START + i as i64 * MINUTE, v)
        })
        .collect()
}

/// Gauge-like readings with two decimal places, taking the int path.
fn generate_decimal_data(n: usize) -> Vec<DataPoint> {
    (0..n)
        .map(|i| {
            let cents = 2_000 + ((i * 37) % 500) as i64;
            DataPoint::new(START + i as i64 * MINUTE, cents as f64 / 100.0)
        })
        .collect()
}

/// Every value identical: every datapoint after the second is a fast-path token.
fn generate_constant_data(n: usize) -> Vec<DataPoint> {
    (0..n)
        .map(|i| DataPoint::new(START + i as i64 * MINUTE, 42.0))
        .collect()
}

fn encode(data: &[DataPoint], opts: Options) -> Bytes {
    let mut enc = Encoder::new(START, opts);
    for dp in data {
        enc.encode(*dp, TimeUnit::Second, None).unwrap();
    }
    enc.finish()
}

fn datasets(size: usize) -> [(&'static str, Vec<DataPoint>); 3] {
    [
        ("float", generate_float_data(size)),
        ("decimal", generate_decimal_data(size)),
        ("constant", generate_constant_data(size)),
    ]
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [100, 1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        for (name, data) in datasets(size) {
            group.bench_with_input(BenchmarkId::new(name, size), &data, |b, data| {
                b.iter(|| black_box(encode(black_box(data), Options::default())));
            });
        }
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for size in [100, 1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(size as u64));
        for (name, data) in datasets(size) {
            let stream = encode(&data, Options::default());
            let mut iter = ReaderIterator::new(Bytes::new(), Options::default());

            group.bench_with_input(BenchmarkId::new(name, size), &stream, |b, stream| {
                b.iter(|| {
                    // Bytes clones share the buffer.
                    iter.reset(stream.clone());
                    let mut sum = 0.0;
                    while iter.next() {
                        sum += iter.current().0.value;
                    }
                    black_box(sum)
                });
            });
        }
    }

    group.finish();
}

fn bench_float_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate_float_only");
    let opts = Options::default().with_int_optimized(false);

    for size in [1_000, 10_000, 100_000] {
        let stream = encode(&generate_float_data(size), opts);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("float", size), &stream, |b, stream| {
            b.iter(|| {
                let mut iter = ReaderIterator::new(stream.clone(), opts);
                let mut count = 0usize;
                while iter.next() {
                    count += 1;
                }
                black_box(count)
            });
        });
    }

    group.finish();
}

fn bench_decode_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_collect");

    for size in [1_000, 10_000, 100_000] {
        let stream = encode(&generate_float_data(size), Options::default());
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("float", size), &stream, |b, stream| {
            b.iter(|| {
                let points = Decoder::decode(black_box(stream.clone()), Options::default()).unwrap();
                black_box(points)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_iterate,
    bench_float_only,
    bench_decode_collect
);
criterion_main!(benches);
