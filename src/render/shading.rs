//! Turning raycast hits into images and tracker reference maps

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::backend::Dispatch;
use crate::core::types::{Vec3, Vec4};
use crate::math::Pose;
use crate::view::ImageMap;
use crate::voxel::{Scene, VoxelReader};
use super::render_state::RenderState;

/// How a raycast is turned into pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderKind {
    /// Grey Lambertian shading, light at the camera
    #[default]
    Shaded,
    /// Fused voxel color
    ColourFromVolume,
    /// Surface normal mapped to RGB
    ColourFromNormal,
}

/// Normal of a normal map entry that has none
pub const NO_NORMAL: Vec4 = Vec4::new(0.0, 0.0, 0.0, -1.0);

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Unit surface normal at a world point, pointing out of the surface
pub fn surface_normal(reader: &mut VoxelReader<'_>, world: Vec3, voxel_size: f32) -> Option<Vec3> {
    let g = reader.gradient(world / voxel_size)?;
    let len = g.length();
    (len > 1e-8).then(|| g / len)
}

/// `(0.8 cos + 0.2) * 255` grey level, `None` when facing away
#[inline]
pub fn lambertian(normal: Vec3, to_light: Vec3) -> Option<u8> {
    let cos = normal.dot(to_light);
    (cos > 0.0).then(|| ((0.8 * cos + 0.2) * 255.0) as u8)
}

/// Normal to RGB, flipped so normals facing the viewer are bright
#[inline]
pub fn normal_to_rgb(n: Vec3) -> [u8; 3] {
    let c = (Vec3::splat(0.3) + (Vec3::ONE - n) * 0.35) * 255.0;
    let c = c.clamp(Vec3::ZERO, Vec3::splat(255.0));
    [c.x as u8, c.y as u8, c.z as u8]
}

/// Render `state.raycast` into `state.image`
pub fn render_image(dispatch: Dispatch, scene: &Scene, kind: RenderKind, state: &mut RenderState) {
    let voxel_size = scene.voxel_size();
    // Light sits at the camera: toward the camera is minus the view axis
    let to_light = -state.pose.inverse().transform_vector(Vec3::Z);
    let RenderState { raycast, image, .. } = state;
    let width = image.width() as usize;

    let mut pixels: Vec<Rgba<u8>> = vec![BLACK; image.width() as usize * image.height() as usize];
    dispatch.rows(&mut pixels, width, |y, row| {
        let mut reader = scene.reader();
        for (x, out) in row.iter_mut().enumerate() {
            let hit = *raycast.get(x as u32, y);
            if hit.w <= 0.0 {
                continue;
            }
            let p = hit.truncate();
            *out = match kind {
                RenderKind::Shaded => surface_normal(&mut reader, p, voxel_size)
                    .and_then(|n| lambertian(n, to_light))
                    .map_or(BLACK, |g| Rgba([g, g, g, 255])),
                RenderKind::ColourFromVolume => reader
                    .color_interpolated(p / voxel_size)
                    .map_or(BLACK, |c| Rgba([c.x as u8, c.y as u8, c.z as u8, 255])),
                RenderKind::ColourFromNormal => surface_normal(&mut reader, p, voxel_size)
                    .map_or(BLACK, |n| {
                        let [r, g, b] = normal_to_rgb(n);
                        Rgba([r, g, b, 255])
                    }),
            };
        }
    });

    for (dst, src) in image.pixels_mut().zip(pixels) {
        *dst = src;
    }
}

/// World-space point and normal maps of the raycast, the reference surface
/// for the next frame's tracking. Points facing away from the camera are
/// dropped from both maps.
pub fn create_icp_maps(
    dispatch: Dispatch,
    scene: &Scene,
    state: &RenderState,
    points: &mut ImageMap<Vec4>,
    normals: &mut ImageMap<Vec4>,
) {
    let size = state.size();
    points.reset(size.x, size.y, NO_NORMAL);
    normals.reset(size.x, size.y, NO_NORMAL);
    let voxel_size = scene.voxel_size();
    let pose = state.pose;

    let rows: Vec<Vec<(Vec4, Vec4)>> = dispatch.map(size.y as usize, |y| {
        let mut reader = scene.reader();
        state
            .raycast
            .row(y as u32)
            .iter()
            .map(|hit| {
                if hit.w <= 0.0 {
                    return (NO_NORMAL, NO_NORMAL);
                }
                let p = hit.truncate();
                match surface_normal(&mut reader, p, voxel_size) {
                    Some(n) if faces_camera(&pose, p, n) => (p.extend(1.0), n.extend(1.0)),
                    _ => (NO_NORMAL, NO_NORMAL),
                }
            })
            .collect()
    });

    for (y, row) in rows.into_iter().enumerate() {
        for (x, (p, n)) in row.into_iter().enumerate() {
            points.set(x as u32, y as u32, p);
            normals.set(x as u32, y as u32, n);
        }
    }
}

/// Check if a surface normal at `p` points toward the camera of `pose`
#[inline]
pub fn faces_camera(pose: &Pose, p: Vec3, n: Vec3) -> bool {
    n.dot(pose.camera_center() - p) > 0.0
}
