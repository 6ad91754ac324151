use criterion::{criterion_group, criterion_main, Criterion, black_box};

use rkfusion::backend::Dispatch;
use rkfusion::core::config::{HashParams, SceneParams};
use rkfusion::core::types::UVec2;
use rkfusion::fusion::{self, AllocationParams, VisibilityList};
use rkfusion::math::Pose;
use rkfusion::render::{self, RenderState};
use rkfusion::view::{Intrinsics, RgbdCalib, View};
use rkfusion::voxel::Scene;

const W: u32 = 160;
const H: u32 = 120;

fn intrinsics() -> Intrinsics {
    Intrinsics::new(150.0, 150.0, 80.0, 60.0)
}

/// Tilted plane so rays cross several block layers
fn plane_view() -> View {
    let mut view = View::new(RgbdCalib::aligned(intrinsics()), UVec2::new(W, H), UVec2::new(W, H), false);
    for y in 0..H {
        for x in 0..W {
            view.depth.set(x, y, 1.5 + 0.004 * x as f32);
        }
    }
    view
}

fn scene() -> Scene {
    Scene::new(
        SceneParams::default(),
        &HashParams {
            bucket_count: 0x4_0000,
            excess_list_size: 0x1_0000,
            local_block_count: 0x1_0000,
        },
    )
}

fn params(scene: &Scene) -> AllocationParams {
    let p = scene.params();
    AllocationParams {
        mu: p.mu,
        block_size: p.block_size_meters(),
        margin_px: 0.0,
        near: p.view_frustum_min,
        far: p.view_frustum_max,
    }
}

fn bench_allocation(c: &mut Criterion) {
    let view = plane_view();
    for (name, dispatch) in [("allocate_serial", Dispatch::Serial), ("allocate_parallel", Dispatch::Parallel)] {
        c.bench_function(name, |b| {
            b.iter(|| {
                let mut scene = scene();
                let params = params(&scene);
                fusion::allocate_and_find_visible(
                    dispatch,
                    &mut scene,
                    black_box(&view),
                    &Pose::IDENTITY,
                    &VisibilityList::new(),
                    &params,
                )
            });
        });
    }
}

fn bench_integration(c: &mut Criterion) {
    let view = plane_view();
    let mut scene = scene();
    let params = params(&scene);
    let (visible, _) =
        fusion::allocate_and_find_visible(Dispatch::Parallel, &mut scene, &view, &Pose::IDENTITY, &VisibilityList::new(), &params);

    for (name, dispatch) in [("integrate_serial", Dispatch::Serial), ("integrate_parallel", Dispatch::Parallel)] {
        c.bench_function(name, |b| {
            b.iter(|| fusion::integrate(dispatch, &mut scene, black_box(&view), &Pose::IDENTITY, &visible));
        });
    }
}

fn bench_raycast(c: &mut Criterion) {
    let view = plane_view();
    let mut scene = scene();
    let params = params(&scene);
    let (visible, _) =
        fusion::allocate_and_find_visible(Dispatch::Parallel, &mut scene, &view, &Pose::IDENTITY, &VisibilityList::new(), &params);
    fusion::integrate(Dispatch::Parallel, &mut scene, &view, &Pose::IDENTITY, &visible);

    let k = intrinsics();
    let mut state = RenderState::new(UVec2::new(W, H), k);
    state.visible_entries = visible.entries().to_vec();
    render::create_expected_depths(Dispatch::Parallel, &scene, &Pose::IDENTITY, &k, &mut state);

    for (name, dispatch) in [("raycast_serial", Dispatch::Serial), ("raycast_parallel", Dispatch::Parallel)] {
        c.bench_function(name, |b| {
            b.iter(|| render::raycast(dispatch, black_box(&scene), &Pose::IDENTITY, &k, &mut state));
        });
    }
}

criterion_group!(
    benches,
    bench_allocation,
    bench_integration,
    bench_raycast,
);

criterion_main!(benches);
