//! Block allocation along depth rays and visibility list construction

use serde::Serialize;

use crate::backend::Dispatch;
use crate::core::types::{IVec3, UVec2};
use crate::math::{Aabb, Pose};
use crate::view::View;
use crate::voxel::{Allocation, Scene};
use super::visibility::{ViewFrustum, VisibilityList, VisibleKind};

/// Allocation counters for one frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocationStats {
    /// Distinct block addresses touched by depth rays
    pub touched_blocks: u32,
    /// Blocks newly allocated this frame
    pub fresh_allocations: u32,
    /// Allocations skipped because the pool or excess list was full
    pub dropped_allocations: u32,
}

/// Inputs that do not change within a frame
#[derive(Clone, Copy, Debug)]
pub struct AllocationParams {
    pub mu: f32,
    pub block_size: f32,
    /// Visibility re-check margin in pixels
    pub margin_px: f32,
    pub near: f32,
    pub far: f32,
}

/// Block addresses crossed by the segment [d - mu, d + mu] behind each valid
/// depth pixel of row `y`. Sorted and unique within the row.
pub fn block_addresses_row(view: &View, camera_to_world: &Pose, params: &AllocationParams, y: u32) -> Vec<IVec3> {
    let k = &view.calib.depth;
    let mut out = Vec::new();
    for x in 0..view.depth.width() {
        let d = *view.depth.get(x, y);
        if d <= 0.0 {
            continue;
        }
        let point = k.unproject(x as f32, y as f32, d);
        let norm = point.length();
        let start = camera_to_world.transform_point(point * (1.0 - params.mu / norm)) / params.block_size;
        let end = camera_to_world.transform_point(point * (1.0 + params.mu / norm)) / params.block_size;

        let delta = end - start;
        let steps = (delta.length() * 2.0).ceil().max(1.0) as u32;
        let step = delta / steps as f32;
        let mut p = start;
        for _ in 0..=steps {
            out.push(p.floor().as_ivec3());
            p += step;
        }
    }
    sort_dedup(&mut out);
    out
}

fn sort_dedup(addrs: &mut Vec<IVec3>) {
    addrs.sort_unstable_by_key(|a| (a.x, a.y, a.z));
    addrs.dedup();
}

/// Allocate every block the depth touches and build this frame's visibility
/// list. Previously visible device blocks that are still inside the
/// enlarged frustum stay on the list.
pub fn allocate_and_find_visible(
    dispatch: Dispatch,
    scene: &mut Scene,
    view: &View,
    pose: &Pose,
    previous: &VisibilityList,
    params: &AllocationParams,
) -> (VisibilityList, AllocationStats) {
    let camera_to_world = pose.inverse();
    let height = view.depth.height() as usize;
    let rows = dispatch.map(height, |y| block_addresses_row(view, &camera_to_world, params, y as u32));

    let mut touched: Vec<IVec3> = rows.into_iter().flatten().collect();
    sort_dedup(&mut touched);

    let mut stats = AllocationStats {
        touched_blocks: touched.len() as u32,
        ..Default::default()
    };
    let mut pairs = Vec::with_capacity(touched.len() + previous.len());
    for addr in touched {
        match scene.allocate(addr) {
            Allocation::Resident { entry, fresh, .. } => {
                if fresh {
                    stats.fresh_allocations += 1;
                }
                pairs.push((entry, VisibleKind::Resident));
            }
            Allocation::Archived { entry } => pairs.push((entry, VisibleKind::NeedsSwapIn)),
            Allocation::Dropped => stats.dropped_allocations += 1,
        }
    }

    let frustum = ViewFrustum {
        pose: *pose,
        intrinsics: view.calib.depth,
        size: UVec2::new(view.depth.width(), view.depth.height()),
        near: params.near,
        far: params.far,
        margin_px: params.margin_px,
    }
    .frustum();
    for entry in previous.entries() {
        let e = scene.entry(*entry);
        if e.ptr.slot().is_none() {
            continue;
        }
        if frustum.intersects_aabb(&Aabb::from_block(e.pos, params.block_size)) {
            pairs.push((*entry, VisibleKind::StillVisible));
        }
    }

    if stats.dropped_allocations > 0 {
        log::debug!("Dropped {} block allocations (capacity)", stats.dropped_allocations);
    }
    (VisibilityList::from_pairs(pairs), stats)
}
