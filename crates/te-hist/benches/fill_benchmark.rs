use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use te_hist::{BinAxis, CatAxis, Hist};

fn make_values(n: usize) -> Vec<f64> {
    // Deterministic spread over [0, 1100) so some values overflow.
    (0..n).map(|i| ((i * 7919) % 11_000) as f64 * 0.1).collect()
}

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("hist_fill");

    for n in [1_000usize, 10_000, 100_000] {
        let values = make_values(n);
        let mask: Vec<bool> = (0..n).map(|i| i % 3 != 0).collect();
        group.bench_with_input(BenchmarkId::new("masked_1d", n), &n, |b, _| {
            b.iter(|| {
                let mut h = Hist::new(
                    "Counts",
                    vec![CatAxis::new("dataset", ""), CatAxis::new("region", "")],
                    vec![BinAxis::regular("recoil", "", 50, 0.0, 1000.0).unwrap()],
                )
                .unwrap();
                h.fill_masked(&["Muon_2022E", "tr_metnomu_den"], &[&values], Some(&mask), None).unwrap();
                black_box(h)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fill);
criterion_main!(benches);
