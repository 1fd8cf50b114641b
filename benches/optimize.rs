use criterion::{black_box, criterion_group, criterion_main, Criterion};

use urban_risk_planner::Core;

fn build_core() -> Core {
    let mut core = Core::new();
    core.add_ego_vehicle(4.5, 1.8, 0.0, 0.0, 0.0, 0.1, 0.1, 8.0, 0.0, 0.0);
    for lane in 0..3 {
        let y = (lane as f64 - 1.0) * 3.5;
        core.add_other_vehicle(4.5, 1.8, 20.0 + lane as f64 * 10.0, y, 200.0 + lane as f64 * 10.0, y, 0.2, 0.2, 6.0, 0.0, false);
    }
    core.add_pedestrian(40.0, -5.0, 40.0, 5.0, 0.2, 0.2, 1.4, 0.0, true);
    core
}

fn bench_one_tick(c: &mut Criterion) {
    c.bench_function("optimize one tick, moderate scene", |b| {
        b.iter_batched(
            build_core,
            |mut core| {
                core.mv(black_box(core.config().dt));
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_ten_second_run(c: &mut Criterion) {
    c.bench_function("optimize, ten second run", |b| {
        b.iter_batched(
            build_core,
            |mut core| {
                while core.mv(core.config().dt) {}
                black_box(core.current_time());
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_one_tick, bench_ten_second_run);
criterion_main!(benches);
