//! Benchmarks for the CPU-side work of seeding particles.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

use swarm::gpu::RecordingDevice;
use swarm::uniforms::UpdateParams;
use swarm::{KernelSource, ParamBlock, ParamLayout, ParticleStateStore, UniformBallSampler};

fn bench_sampler(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    c.bench_function("uniform_ball_sample", |b| {
        b.iter(|| black_box(UniformBallSampler.sample(&mut rng)))
    });
}

fn bench_seed(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_seed");

    for count in [10_000u32, 100_000, 1_000_000] {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        if store.allocate(&mut device, count).is_err() {
            continue;
        }

        group.throughput(Throughput::Elements(u64::from(count)));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                store
                    .seed(&mut device, &UniformBallSampler, &mut rng)
                    .ok();
                device.take_ops();
            })
        });
    }

    group.finish();
}

fn bench_param_upload(c: &mut Criterion) {
    let source = KernelSource::update(256);
    let layout = match ParamLayout::reflect(&source.wgsl) {
        Ok(layout) => layout,
        Err(_) => return,
    };
    let mut block = ParamBlock::new("bench", layout);
    let params = UpdateParams {
        delta_time: 0.016,
        sphere_enabled: true,
        attractor1_position: glam::Vec3::X,
        attractor2_position: -glam::Vec3::X,
        attractor_gravity: 2.0,
        bounding_sphere: glam::Vec4::new(0.0, 0.0, 0.0, 6.0),
        floor_y: -4.0,
        floor_enabled: false,
        gradient_start_color: glam::Vec3::ONE,
        gradient_end_color: glam::Vec3::ZERO,
        color_scale: 0.25,
    };

    c.bench_function("update_params_write", |b| {
        b.iter(|| {
            block.write(black_box(&params));
            black_box(block.bytes());
        })
    });
}

criterion_group!(benches, bench_sampler, bench_seed, bench_param_upload);
criterion_main!(benches);
