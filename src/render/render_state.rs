//! Per-viewpoint raycast buffers

use image::RgbaImage;

use crate::core::types::{UVec2, Vec2, Vec4};
use crate::math::Pose;
use crate::view::{ImageMap, Intrinsics};

/// Expected-depth ranges are stored at 1/8 of the image resolution
pub const EXPECTED_DEPTH_SUBSAMPLE: u32 = 8;

/// Range of a pixel no visible block projects to (min > max)
pub const EMPTY_RANGE: Vec2 = Vec2::new(f32::MAX, 0.0);

/// Raycast result of a pixel whose ray hit nothing
pub const NO_HIT: Vec4 = Vec4::new(0.0, 0.0, 0.0, -1.0);

/// Everything one viewpoint's raycast produces.
///
/// The live state is refreshed every frame at the tracked pose and feeds
/// the tracker. Free-viewpoint renders own a separate state.
pub struct RenderState {
    /// Per 8x8 tile: x = nearest, y = farthest camera depth of any
    /// visible block
    pub expected_depth: ImageMap<Vec2>,
    /// World-space hit point, w = 1 hit / -1 no hit
    pub raycast: ImageMap<Vec4>,
    /// Last rendered image
    pub image: RgbaImage,
    /// Device-resident hash entries this state was raycast against
    pub visible_entries: Vec<u32>,
    /// Camera the buffers were produced for
    pub pose: Pose,
    pub intrinsics: Intrinsics,
}

impl RenderState {
    pub fn new(size: UVec2, intrinsics: Intrinsics) -> Self {
        let tiles = Self::expected_depth_size(size);
        Self {
            expected_depth: ImageMap::new(tiles.x, tiles.y, EMPTY_RANGE),
            raycast: ImageMap::new(size.x, size.y, NO_HIT),
            image: RgbaImage::new(size.x, size.y),
            visible_entries: Vec::new(),
            pose: Pose::IDENTITY,
            intrinsics,
        }
    }

    /// Image size in pixels
    pub fn size(&self) -> UVec2 {
        self.raycast.dims()
    }

    /// Tile grid covering an image of `size`
    pub fn expected_depth_size(size: UVec2) -> UVec2 {
        UVec2::new(
            size.x.div_ceil(EXPECTED_DEPTH_SUBSAMPLE),
            size.y.div_ceil(EXPECTED_DEPTH_SUBSAMPLE),
        )
    }

    /// Number of pixels whose ray found the surface
    pub fn hit_count(&self) -> usize {
        self.raycast.data().iter().filter(|p| p.w > 0.0).count()
    }
}
