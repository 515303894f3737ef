use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ipcount_rs::ipv4;

const OPS_PER_ITER: u64 = 10_000;

// Simple xorshift for reproducible random addresses.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

fn make_lines(count: usize, seed: u64) -> Vec<String> {
    let mut rng = XorShift64::new(seed);
    (0..count)
        .map(|_| ipv4::format(rng.next_u64() as u32))
        .collect()
}

fn bench_parse_valid(c: &mut Criterion) {
    let mut group = c.benchmark_group("ipv4/parse");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    let lines = make_lines(OPS_PER_ITER as usize, 0xdead_beef);

    group.bench_function("valid_random", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(ipv4::parse(black_box(line.as_bytes())).unwrap());
            }
        })
    });

    group.bench_function("valid_short", |b| {
        b.iter(|| black_box(ipv4::parse(black_box(b"1.2.3.4"))))
    });

    group.bench_function("valid_long", |b| {
        b.iter(|| black_box(ipv4::parse(black_box(b"255.255.255.255"))))
    });

    group.finish();
}

fn bench_parse_invalid(c: &mut Criterion) {
    let mut group = c.benchmark_group("ipv4/parse_reject");

    // Rejection cost matters: skipped lines still pass through the codec.
    group.bench_function("garbage", |b| {
        b.iter(|| black_box(ipv4::parse(black_box(b"not-an-address"))).is_err())
    });

    group.bench_function("out_of_range", |b| {
        b.iter(|| black_box(ipv4::parse(black_box(b"300.300.300.300"))).is_err())
    });

    group.finish();
}

criterion_group!(benches, bench_parse_valid, bench_parse_invalid);
criterion_main!(benches);
