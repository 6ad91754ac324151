//! Per-pixel ray marching through the TSDF

use crate::backend::Dispatch;
use crate::core::types::{Vec3, Vec4};
use crate::math::{Pose, Ray};
use crate::view::Intrinsics;
use crate::voxel::{Scene, VoxelReader, BLOCK_SIZE};
use super::render_state::{RenderState, EXPECTED_DEPTH_SUBSAMPLE, NO_HIT};

/// Scene constants the marcher needs
#[derive(Clone, Copy, Debug)]
pub struct MarchParams {
    pub voxel_size: f32,
    pub mu: f32,
}

impl MarchParams {
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            voxel_size: scene.params().voxel_size,
            mu: scene.params().mu,
        }
    }
}

/// March `ray` from metric length `t_min` to `t_max` and return the first
/// zero crossing of the sdf in world coordinates.
///
/// Unallocated space is skipped a block at a time. Inside allocated blocks
/// the step is the sdf scaled to meters, never less than one voxel. The hit
/// is refined by interpolating linearly between the last positive and the
/// first non-positive sample.
pub fn cast_ray(reader: &mut VoxelReader<'_>, ray: &Ray, t_min: f32, t_max: f32, params: &MarchParams) -> Option<Vec3> {
    let inv_voxel = 1.0 / params.voxel_size;
    let block_step = params.voxel_size * BLOCK_SIZE as f32;
    let mut t = t_min;
    let mut prev: Option<(f32, f32)> = None;

    while t < t_max {
        let Some(sdf) = reader.sdf_interpolated(ray.at(t) * inv_voxel) else {
            prev = None;
            t += block_step;
            continue;
        };
        if sdf <= 0.0 {
            let t_hit = match prev {
                Some((t_prev, sdf_prev)) => t_prev + (t - t_prev) * sdf_prev / (sdf_prev - sdf),
                None => t,
            };
            return Some(ray.at(t_hit));
        }
        prev = Some((t, sdf));
        t += (sdf * params.mu).max(params.voxel_size);
    }
    None
}

/// Raycast every pixel of `state` inside its expected depth range
pub fn raycast(dispatch: Dispatch, scene: &Scene, pose: &Pose, intrinsics: &Intrinsics, state: &mut RenderState) {
    let params = MarchParams::from_scene(scene);
    let RenderState { expected_depth, raycast: hits, .. } = state;
    let width = hits.width() as usize;

    dispatch.rows(hits.data_mut(), width, |y, row| {
        let mut reader = scene.reader();
        for (x, out) in row.iter_mut().enumerate() {
            let x = x as u32;
            let range = *expected_depth.get(x / EXPECTED_DEPTH_SUBSAMPLE, y / EXPECTED_DEPTH_SUBSAMPLE);
            if range.x > range.y {
                *out = NO_HIT;
                continue;
            }
            let (ray, scale) = Ray::through_pixel(intrinsics, pose, x as f32, y as f32);
            *out = cast_ray(&mut reader, &ray, range.x * scale, range.y * scale, &params)
                .map_or(NO_HIT, |p| p.extend(1.0));
        }
    });
    state.pose = *pose;
    state.intrinsics = *intrinsics;
}

/// World-space hit point at a pixel, if any
pub fn hit_at(state: &RenderState, x: u32, y: u32) -> Option<Vec3> {
    let p: Vec4 = *state.raycast.get(x, y);
    (p.w > 0.0).then(|| p.truncate())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::{HashParams, SceneParams};
    use crate::core::types::{IVec3, UVec2};
    use crate::render::expected_depth::create_expected_depths;
    use crate::voxel::block::local_from_index;

    /// Scene holding an analytic plane `z = depth` (camera looks down +z),
    /// written directly into the voxels around it
    pub(crate) fn plane_scene(depth: f32, half_extent: i32) -> Scene {
        let mut scene = Scene::new(
            SceneParams::default(),
            &HashParams {
                bucket_count: 0x1000,
                excess_list_size: 0x400,
                local_block_count: 0x1000,
            },
        );
        let voxel = scene.voxel_size();
        let mu = scene.params().mu;
        let zc = scene.block_address(Vec3::new(0.0, 0.0, depth)).z;
        for bx in -half_extent..half_extent {
            for by in -half_extent..half_extent {
                for bz in zc - 1..=zc + 1 {
                    let addr = IVec3::new(bx, by, bz);
                    let slot = scene.allocate_if_absent(addr).unwrap();
                    for (i, v) in scene.block_mut(slot).voxels.iter_mut().enumerate() {
                        let world = (addr * BLOCK_SIZE + local_from_index(i)).as_vec3() * voxel;
                        let eta = depth - world.z;
                        if eta.abs() <= mu {
                            v.fuse_depth(eta / mu, 100);
                            v.fuse_color(Vec3::new(200.0, 100.0, 50.0), 100);
                        }
                    }
                }
            }
        }
        scene
    }

    pub(crate) fn camera() -> Intrinsics {
        Intrinsics::new(40.0, 40.0, 16.0, 12.0)
    }

    pub(crate) fn live_state(scene: &Scene, dispatch: Dispatch) -> RenderState {
        let mut state = RenderState::new(UVec2::new(32, 24), camera());
        state.visible_entries = scene.hash().iter_live().map(|(id, _)| id).collect();
        create_expected_depths(dispatch, scene, &Pose::IDENTITY, &camera(), &mut state);
        raycast(dispatch, scene, &Pose::IDENTITY, &camera(), &mut state);
        state
    }

    #[test]
    fn test_frontal_plane_depth() {
        let scene = plane_scene(2.0, 8);
        let state = live_state(&scene, Dispatch::Serial);
        let hit = hit_at(&state, 16, 12).unwrap();
        assert!((hit.z - 2.0).abs() <= scene.voxel_size());
        assert!(state.hit_count() > 0);
    }

    #[test]
    fn test_raycast_is_deterministic() {
        let scene = plane_scene(1.5, 8);
        let serial = live_state(&scene, Dispatch::Serial);
        let parallel = live_state(&scene, Dispatch::Parallel);
        let again = live_state(&scene, Dispatch::Parallel);
        assert_eq!(serial.raycast, parallel.raycast);
        assert_eq!(parallel.raycast, again.raycast);
    }

    #[test]
    fn test_empty_range_is_no_hit() {
        let scene = plane_scene(2.0, 2);
        let mut state = RenderState::new(UVec2::new(32, 24), camera());
        raycast(Dispatch::Serial, &scene, &Pose::IDENTITY, &camera(), &mut state);
        assert_eq!(state.hit_count(), 0);
        assert!(hit_at(&state, 0, 0).is_none());
    }

    #[test]
    fn test_unallocated_space_is_skipped() {
        let scene = plane_scene(2.0, 2);
        let mut reader = scene.reader();
        let ray = Ray::new(Vec3::new(5.0, 5.0, 0.0), Vec3::Z);
        let params = MarchParams::from_scene(&scene);
        assert!(cast_ray(&mut reader, &ray, 0.2, 3.0, &params).is_none());
    }
}
