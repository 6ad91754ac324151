//! Expected depth ranges: where along each ray the surface can be.
//!
//! Every visible block's corners are projected into the image; each
//! 8x8 tile records the nearest and farthest camera depth of the blocks
//! covering it. Raycasting only marches inside that range.

use crate::backend::Dispatch;
use crate::core::types::{UVec2, Vec2};
use crate::math::{Aabb, Pose};
use crate::view::Intrinsics;
use crate::voxel::Scene;
use super::render_state::{RenderState, EMPTY_RANGE, EXPECTED_DEPTH_SUBSAMPLE};

/// Tile footprint and depth range of one projected block
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockFootprint {
    /// Inclusive tile bounds
    pub min: UVec2,
    pub max: UVec2,
    /// Nearest and farthest camera depth
    pub z: Vec2,
}

/// Project a block's bounds into the tile grid. `None` when the block is
/// entirely behind the near plane or off screen.
pub fn block_footprint(
    aabb: &Aabb,
    pose: &Pose,
    intrinsics: &Intrinsics,
    image_size: UVec2,
    near: f32,
) -> Option<BlockFootprint> {
    let mut lo = Vec2::splat(f32::MAX);
    let mut hi = Vec2::splat(f32::MIN);
    let mut z = Vec2::new(f32::MAX, f32::MIN);
    let mut any_in_front = false;

    for corner in aabb.corners() {
        let p = pose.transform_point(corner);
        z.x = z.x.min(p.z);
        z.y = z.y.max(p.z);
        if p.z < 1e-6 {
            continue;
        }
        any_in_front = true;
        let uv = intrinsics.project(p);
        lo = lo.min(uv);
        hi = hi.max(uv);
    }
    if !any_in_front || z.y < near {
        return None;
    }
    if z.x < near {
        // Block straddles the camera: it may cover any part of the image
        z.x = near;
        lo = Vec2::ZERO;
        hi = image_size.as_vec2();
    }

    let scale = EXPECTED_DEPTH_SUBSAMPLE as f32;
    let tiles = RenderState::expected_depth_size(image_size).as_vec2();
    let lo = (lo / scale).floor().max(Vec2::ZERO);
    let hi = (hi / scale).floor().min(tiles - Vec2::ONE);
    if lo.x > hi.x || lo.y > hi.y {
        return None;
    }
    Some(BlockFootprint {
        min: lo.as_uvec2(),
        max: hi.as_uvec2(),
        z,
    })
}

/// Fill `state.expected_depth` from the blocks in `state.visible_entries`
/// seen from `pose`
pub fn create_expected_depths(dispatch: Dispatch, scene: &Scene, pose: &Pose, intrinsics: &Intrinsics, state: &mut RenderState) {
    let image_size = state.size();
    let near = scene.params().view_frustum_min;
    let block_size = scene.params().block_size_meters();
    let entries = &state.visible_entries;

    let footprints: Vec<BlockFootprint> = dispatch
        .map(entries.len(), |i| {
            let aabb = Aabb::from_block(scene.entry(entries[i]).pos, block_size);
            block_footprint(&aabb, pose, intrinsics, image_size, near)
        })
        .into_iter()
        .flatten()
        .collect();

    let width = state.expected_depth.width() as usize;
    dispatch.rows(state.expected_depth.data_mut(), width, |y, row| {
        row.fill(EMPTY_RANGE);
        for fp in footprints.iter().filter(|fp| fp.min.y <= y && y <= fp.max.y) {
            for range in &mut row[fp.min.x as usize..=fp.max.x as usize] {
                range.x = range.x.min(fp.z.x);
                range.y = range.y.max(fp.z.y);
            }
        }
    });
    state.pose = *pose;
    state.intrinsics = *intrinsics;
    log::trace!("Expected depths from {} block footprints", footprints.len());
}
