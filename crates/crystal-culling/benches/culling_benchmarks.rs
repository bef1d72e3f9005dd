use criterion::{Criterion, black_box, criterion_group, criterion_main};
use crystal_config::CullingConfig;
use crystal_culling::FrustumCullingManager;
use crystal_math::BoundingSphere;
use crystal_scene::{CameraPose, NodeArena};
use glam::Vec3;

fn crystal_field(count: usize) -> (FrustumCullingManager, NodeArena) {
    let mut scene = NodeArena::new();
    let mut manager = FrustumCullingManager::new(CullingConfig {
        update_interval_ms: 0.0,
        ..CullingConfig::default()
    });
    for i in 0..count {
        let t = i as f32;
        let position = Vec3::new(
            (t * 37.0) % 6000.0 - 3000.0,
            (t * 13.0) % 400.0 - 200.0,
            (t * 71.0) % 6000.0 - 3000.0,
        );
        let node = scene.spawn_at(position, 2.0);
        manager.add_object(format!("crystal-{i}"), node, 1.0, &mut scene);
    }
    (manager, scene)
}

fn bench_budgeted_pass(c: &mut Criterion) {
    let (mut manager, mut scene) = crystal_field(5000);
    let camera = CameraPose::default();
    let mut now = 0.0;
    c.bench_function("culling_budgeted_pass_5000", |bencher| {
        bencher.iter(|| {
            now += 16.0;
            black_box(manager.update(now, &camera, &mut scene))
        })
    });
}

fn bench_force_update_all(c: &mut Criterion) {
    let (mut manager, mut scene) = crystal_field(5000);
    let camera = CameraPose::default();
    c.bench_function("culling_force_update_all_5000", |bencher| {
        bencher.iter(|| black_box(manager.force_update_all(0.0, &camera, &mut scene)))
    });
}

fn bench_sphere_frustum_test(c: &mut Criterion) {
    let frustum = CameraPose::default().frustum();
    let sphere = black_box(BoundingSphere::new(Vec3::new(10.0, 0.0, -100.0), 3.0));
    c.bench_function("sphere_frustum_test", |bencher| {
        bencher.iter(|| black_box(frustum.intersects_sphere(&sphere)))
    });
}

criterion_group!(
    benches,
    bench_budgeted_pass,
    bench_force_update_all,
    bench_sphere_frustum_test
);
criterion_main!(benches);
