//! Raycasting: expected depth ranges, ray marching and shading

pub mod render_state;
pub mod expected_depth;
pub mod raycast;
pub mod shading;

pub use render_state::{RenderState, EMPTY_RANGE, EXPECTED_DEPTH_SUBSAMPLE, NO_HIT};
pub use expected_depth::{block_footprint, create_expected_depths, BlockFootprint};
pub use raycast::{cast_ray, hit_at, raycast, MarchParams};
pub use shading::{create_icp_maps, render_image, RenderKind, NO_NORMAL};
