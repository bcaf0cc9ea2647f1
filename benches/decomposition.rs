/* benches/decomposition.rs */
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use criterion::{
    black_box, criterion_group, criterion_main, AxisScale, BenchmarkId, Criterion,
    PlotConfiguration, Throughput,
};
use dect::{
    BackendId, ClosedFormSolver, Dispatcher, Enhancement, FractionSolver, MaterialModel,
    Measurement, MeasurementBatch, OutputRepr, Precision, RunConfig, SearchSolver,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random on-plane phantom: voxels are mixtures of the three model materials.
fn phantom(voxels: usize, seed: u64) -> MeasurementBatch {
    let model = MaterialModel::default();
    let mut rng = StdRng::seed_from_u64(seed);
    let pairs: Vec<Measurement> = (0..voxels)
        .map(|_| {
            let ab: f64 = rng.random_range(0.0..=1.0);
            let ratio: f64 = rng.random_range(0.0..=1.0);
            let (a, b) = model.mix(&dect::FractionTriple::from_search(ab, ratio));
            Measurement::new(a.round() as i16, b.round() as i16)
        })
        .collect();
    MeasurementBatch::from_pairs(&pairs)
}

/// Per-voxel cost of each solver variant.
fn bench_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve_voxel");
    let model = MaterialModel::default();
    let voxel = Measurement::new(91, 54);

    let standard = SearchSolver::<f64>::new(&model, 0.001, Enhancement::Standard, true).unwrap();
    let enhanced =
        SearchSolver::<f64>::new(&model, 0.001, Enhancement::BiasCancelling, true).unwrap();
    let single = SearchSolver::<f32>::new(&model, 0.001, Enhancement::Standard, true).unwrap();
    let closed = ClosedFormSolver::<f64>::new(&model).unwrap();

    group.bench_function("search_f64", |b| b.iter(|| standard.solve(black_box(voxel))));
    group.bench_function("search_f64_enhanced", |b| b.iter(|| enhanced.solve(black_box(voxel))));
    group.bench_function("search_f32", |b| b.iter(|| single.solve(black_box(voxel))));
    group.bench_function("closed_form_f64", |b| b.iter(|| closed.solve(black_box(voxel))));

    for &min_step in &[0.01, 0.001, 0.0001] {
        let solver =
            SearchSolver::<f64>::new(&model, min_step, Enhancement::Standard, true).unwrap();
        group.bench_with_input(BenchmarkId::new("min_step", min_step), &min_step, |b, _| {
            b.iter(|| solver.solve(black_box(voxel)))
        });
    }

    group.finish();
}

/// Whole-batch throughput through the dispatcher.
fn bench_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_batch");
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));
    group.sample_size(20);

    for &voxels in &[1_024usize, 16_384, 65_536] {
        let batch = phantom(voxels, 0x00de_c7);
        group.throughput(Throughput::Elements(voxels as u64));

        for (label, backend, precision) in [
            ("cpu_search_f64", BackendId::CpuSearch, Precision::Double),
            ("cpu_search_f32", BackendId::CpuSearch, Precision::Single),
            ("cpu_closed_form", BackendId::CpuClosedForm, Precision::Double),
        ] {
            let config = RunConfig {
                backend,
                precision,
                repr: OutputRepr::U16,
                merge_ratio: Some(0.5),
                ..RunConfig::default()
            };
            let dispatcher = Dispatcher::new(config).unwrap();
            group.bench_with_input(BenchmarkId::new(label, voxels), &batch, |b, batch| {
                b.iter(|| dispatcher.dispatch(black_box(batch)).unwrap())
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_solvers, bench_batches);
criterion_main!(benches);
