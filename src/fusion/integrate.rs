//! TSDF integration of one view into the visible blocks

use image::RgbaImage;

use crate::backend::Dispatch;
use crate::core::config::SceneParams;
use crate::core::types::{IVec3, Vec2, Vec3};
use crate::math::Pose;
use crate::view::View;
use crate::voxel::{block::local_from_index, Scene, VoxelBlock, BLOCK_SIZE};
use super::visibility::VisibilityList;

/// Bilinear RGB sample, `None` outside the image
fn sample_rgb(img: &RgbaImage, uv: Vec2) -> Option<Vec3> {
    let (w, h) = img.dimensions();
    if uv.x < 0.0 || uv.y < 0.0 || uv.x > (w - 1) as f32 || uv.y > (h - 1) as f32 {
        return None;
    }
    let x0 = uv.x.floor() as u32;
    let y0 = uv.y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = uv.x - x0 as f32;
    let fy = uv.y - y0 as f32;
    let px = |x, y| {
        let p = img.get_pixel(x, y).0;
        Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32)
    };
    Some(
        px(x0, y0) * (1.0 - fx) * (1.0 - fy)
            + px(x1, y0) * fx * (1.0 - fy)
            + px(x0, y1) * (1.0 - fx) * fy
            + px(x1, y1) * fx * fy,
    )
}

/// Fuse the view into every voxel of one block.
///
/// `pose` takes world to depth-camera coordinates. Voxels whose signed
/// distance to the observed surface exceeds the band are left untouched.
pub fn integrate_block(block: &mut VoxelBlock, addr: IVec3, params: &SceneParams, view: &View, pose: &Pose) {
    let depth = &view.depth;
    let k = &view.calib.depth;
    let k_rgb = &view.calib.rgb;
    let depth_to_rgb = &view.calib.depth_to_rgb;
    let (w, h) = (depth.width() as f32, depth.height() as f32);
    let base = addr * BLOCK_SIZE;
    let mu = params.mu;

    for (i, voxel) in block.voxels.iter_mut().enumerate() {
        if params.stop_integrating_at_max_w && voxel.w_depth >= params.max_w {
            continue;
        }
        let world = (base + local_from_index(i)).as_vec3() * params.voxel_size;
        let p = pose.transform_point(world);
        if p.z <= 0.0 {
            continue;
        }
        let uv = k.project(p);
        if uv.x < 1.0 || uv.x > w - 2.0 || uv.y < 1.0 || uv.y > h - 2.0 {
            continue;
        }
        let d = *depth.get((uv.x + 0.5) as u32, (uv.y + 0.5) as u32);
        if !(d > 0.0) {
            continue;
        }
        let eta = d - p.z;
        if eta.abs() > mu {
            continue;
        }
        voxel.fuse_depth(eta / mu, params.max_w);

        if eta.abs() < 0.25 * mu {
            let p_rgb = depth_to_rgb.transform_point(p);
            if p_rgb.z > 0.0 {
                if let Some(rgb) = sample_rgb(&view.rgb, k_rgb.project(p_rgb)) {
                    voxel.fuse_color(rgb, params.max_w);
                }
            }
        }
    }
}

/// Integrate the view into every visible, device-resident block
pub fn integrate(dispatch: Dispatch, scene: &mut Scene, view: &View, pose: &Pose, visible: &VisibilityList) {
    let params = scene.params().clone();
    let mut targets: Vec<Option<IVec3>> = vec![None; scene.pool().capacity() as usize];
    let mut count = 0;
    for entry in visible.entries() {
        let e = scene.entry(*entry);
        if let Some(slot) = e.ptr.slot() {
            targets[slot as usize] = Some(e.pos);
            count += 1;
        }
    }
    if count == 0 {
        return;
    }

    dispatch.for_each_mut(scene.pool_mut().blocks_mut(), |slot, block| {
        if let Some(addr) = targets[slot] {
            integrate_block(block, addr, &params, view, pose);
        }
    });
    log::trace!("Integrated {} blocks", count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::HashParams;
    use crate::core::types::UVec2;
    use crate::view::{Intrinsics, RgbdCalib};
    use crate::voxel::Voxel;

    fn plane_view(depth: f32, color: [u8; 4]) -> View {
        let k = Intrinsics::new(40.0, 40.0, 16.0, 12.0);
        let mut view = View::new(RgbdCalib::aligned(k), UVec2::new(32, 24), UVec2::new(32, 24), false);
        view.depth.fill(depth);
        for p in view.rgb.pixels_mut() {
            p.0 = color;
        }
        view
    }

    /// Block containing the camera-axis point at `depth`
    fn axis_block(scene: &mut Scene, depth: f32) -> (u32, IVec3) {
        let addr = scene.block_address(Vec3::new(0.0, 0.0, depth));
        (scene.allocate_if_absent(addr).unwrap(), addr)
    }

    fn scene() -> Scene {
        Scene::new(
            SceneParams::default(),
            &HashParams {
                bucket_count: 64,
                excess_list_size: 8,
                local_block_count: 8,
            },
        )
    }

    #[test]
    fn test_truncation_band_exclusion() {
        let mut scene = scene();
        let params = scene.params().clone();
        let (slot, addr) = axis_block(&mut scene, 1.0);
        let view = plane_view(1.0, [10, 20, 30, 255]);

        let block = scene.block_mut(slot);
        integrate_block(block, addr, &params, &view, &Pose::IDENTITY);

        let mut written = 0;
        for (i, v) in block.voxels.iter().enumerate() {
            let z = (addr * BLOCK_SIZE + local_from_index(i)).z as f32 * params.voxel_size;
            let eta = 1.0 - z;
            if eta.abs() > params.mu + 1e-4 {
                assert_eq!(*v, Voxel::EMPTY, "voxel at z={z} outside the band was written");
            } else if v.is_observed() {
                written += 1;
                assert!((v.sdf() - eta / params.mu).abs() < 1e-3);
            }
        }
        assert!(written > 0);
    }

    #[test]
    fn test_color_only_near_surface() {
        let mut scene = scene();
        let params = scene.params().clone();
        let (slot, addr) = axis_block(&mut scene, 1.0);
        let view = plane_view(1.0, [200, 100, 50, 255]);
        let block = scene.block_mut(slot);
        integrate_block(block, addr, &params, &view, &Pose::IDENTITY);

        for (i, v) in block.voxels.iter().enumerate() {
            let z = (addr * BLOCK_SIZE + local_from_index(i)).z as f32 * params.voxel_size;
            if v.w_color > 0 {
                assert!((1.0 - z).abs() < 0.25 * params.mu);
                assert_eq!(v.clr, [200, 100, 50]);
            }
        }
    }

    #[test]
    fn test_weight_ceiling_holds_over_many_frames() {
        let mut scene = scene();
        let mut params = scene.params().clone();
        params.max_w = 5;
        let (slot, addr) = axis_block(&mut scene, 1.0);
        let view = plane_view(1.0, [0, 0, 0, 255]);
        for _ in 0..20 {
            integrate_block(scene.block_mut(slot), addr, &params, &view, &Pose::IDENTITY);
        }
        assert!(scene.block(slot).voxels.iter().all(|v| v.w_depth <= 5));
        assert!(scene.block(slot).voxels.iter().any(|v| v.w_depth == 5));
    }

    #[test]
    fn test_integrate_only_touches_visible_resident_blocks() {
        let mut scene = scene();
        let (visible_slot, _) = axis_block(&mut scene, 1.0);
        let hidden_addr = scene.block_address(Vec3::new(0.0, 0.0, 1.0)) + IVec3::new(0, 0, 1);
        let hidden_slot = scene.allocate_if_absent(hidden_addr).unwrap();
        let entry = scene.find_entry(scene.block_address(Vec3::new(0.0, 0.0, 1.0))).unwrap();
        let visible = crate::fusion::VisibilityList::from_pairs(vec![(entry, crate::fusion::VisibleKind::Resident)]);

        // Surface inside the hidden block
        let view = plane_view(1.05, [0, 0, 0, 255]);
        integrate(Dispatch::Parallel, &mut scene, &view, &Pose::IDENTITY, &visible);
        assert_eq!(*scene.block(hidden_slot), VoxelBlock::EMPTY);
        assert!(scene.block(visible_slot).is_observed());
    }
}
