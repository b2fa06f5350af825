use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gatewarden_core::{DetectionEvent, Plate, PlateNormalizer};
use gatewarden_engine::{AccessLists, AccessRegistry, VerificationAggregator};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_plate(i: usize) -> String {
    let a = (b'A' + (i % 26) as u8) as char;
    let b = (b'A' + ((i / 26) % 26) as u8) as char;
    format!("{a}{:04}{b}{a}", i % 10_000)
}

/// Detection stream where every `noise_every`-th frame is a misread.
fn make_stream(n: usize, noise_every: usize) -> Vec<DetectionEvent> {
    let t0 = Instant::now();
    (0..n)
        .map(|i| {
            let plate = if noise_every > 0 && i % noise_every == noise_every - 1 {
                Plate::exact("X0000XX")
            } else {
                Plate::exact("R3944FG")
            };
            DetectionEvent::new(plate, 0.9, t0 + Duration::from_millis(i as u64 * 100))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmark: consensus aggregation
// ---------------------------------------------------------------------------

fn bench_aggregator(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator_observe");
    for noise_every in [0usize, 4, 2] {
        let stream = make_stream(1_000, noise_every);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("noise_every_{noise_every}")),
            &stream,
            |b, stream| {
                b.iter(|| {
                    let mut agg = VerificationAggregator::new(3, 0.5, Duration::from_secs(600));
                    let mut verdicts = 0usize;
                    for d in stream {
                        if let gatewarden_engine::Observation::Verdict(_) =
                            agg.observe(black_box(d.clone()))
                        {
                            verdicts += 1;
                        }
                    }
                    black_box(verdicts)
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: normalization
// ---------------------------------------------------------------------------

fn bench_normalizer(c: &mut Criterion) {
    let exact = PlateNormalizer::new();
    let fuzzy = PlateNormalizer::new()
        .with_separator_stripping(true)
        .with_confusable_folding(true)
        .with_known_prefixes([("3944FG", "R")]);
    let inputs = ["R3944FG", " r 3944-fg ", "3944FG", "R3.944.FG", "?!"];

    let mut group = c.benchmark_group("normalize");
    group.bench_function("exact", |b| {
        b.iter(|| {
            for s in inputs {
                black_box(exact.normalize(black_box(s)));
            }
        })
    });
    group.bench_function("fuzzy", |b| {
        b.iter(|| {
            for s in inputs {
                black_box(fuzzy.normalize(black_box(s)));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: registry lookup
// ---------------------------------------------------------------------------

fn bench_registry(c: &mut Criterion) {
    let normalizer = PlateNormalizer::new();
    let mut group = c.benchmark_group("registry_lookup");
    for size in [10usize, 1_000, 10_000] {
        let homeowner: Vec<String> = (0..size).map(make_plate).collect();
        let guest: Vec<String> = (size..size * 2).map(make_plate).collect();
        let registry = AccessRegistry::new(AccessLists::from_raw(
            &normalizer,
            homeowner.as_slice(),
            guest.as_slice(),
        ));
        let probes: Vec<Plate> = [0, size / 2, size + 1, size * 3]
            .into_iter()
            .map(|i| normalizer.normalize(&make_plate(i)))
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &probes, |b, probes| {
            b.iter(|| {
                for p in probes {
                    black_box(registry.is_authorized(black_box(p)));
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_aggregator, bench_normalizer, bench_registry);
criterion_main!(benches);
