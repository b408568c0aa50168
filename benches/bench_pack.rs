//! Weight-packing and operator-creation benchmarks.
//!
//! Packing cost matters at model-load time: every fully-connected layer is
//! repacked once into the tile layout. Reported throughput is source bytes
//! per second.

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use rand::Rng;
use std::time::Duration;

use q8_kernels::{
    kernel_context, PackedWeights, QuantizationParams, QuantizedFullyConnected, ReferencePacker,
    WeightPacker,
};

fn random_u8_vec(n: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen()).collect()
}

fn random_i32_vec(n: usize) -> Vec<i32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen_range(-1 << 20..1 << 20)).collect()
}

fn bench_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc/pack");
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(3));

    let ctx = kernel_context();
    let sizes: &[(usize, usize)] = &[
        (768, 768),     // BERT-base hidden
        (4096, 4096),   // LLaMA-7B hidden
        (4096, 11008),  // LLaMA-7B FFN
    ];

    for &(ic, oc) in sizes {
        group.throughput(Throughput::Bytes((oc * ic) as u64));
        let kernel = random_u8_vec(oc * ic);
        let bias = random_i32_vec(oc);

        group.bench_with_input(
            BenchmarkId::new("reference", format!("{oc}x{ic}")),
            &(ic, oc),
            |bench, &(ic, oc)| {
                bench.iter(|| {
                    let mut packed =
                        PackedWeights::allocate(ctx.nr, ctx.kr, oc, ic, 128).unwrap();
                    ReferencePacker.pack(oc, ic, black_box(&kernel), black_box(&bias), &mut packed);
                    black_box(packed);
                });
            },
        );
    }
    group.finish();
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("fc/create");
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(3));

    let ctx = kernel_context();
    let sizes: &[(usize, usize)] = &[(768, 768), (4096, 4096)];

    for &(ic, oc) in sizes {
        group.throughput(Throughput::Bytes((oc * ic) as u64));
        let kernel = random_u8_vec(oc * ic);
        let bias = random_i32_vec(oc);

        group.bench_with_input(
            BenchmarkId::new("create", format!("{oc}x{ic}")),
            &(ic, oc),
            |bench, &(ic, oc)| {
                bench.iter(|| {
                    let op = QuantizedFullyConnected::new(
                        ctx,
                        ic,
                        oc,
                        QuantizationParams::new(0.02, 0),
                        QuantizationParams::new(0.008, 128),
                        QuantizationParams::new(0.05, 0),
                        0,
                        255,
                        black_box(&kernel),
                        black_box(&bias),
                    )
                    .unwrap();
                    black_box(op);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_pack, bench_create);
criterion_main!(benches);
