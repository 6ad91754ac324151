//! Fusion engine settings.
//!
//! Every field has a default matching the usual Kinect-class setup (5 mm
//! voxels, 2 cm truncation band, 100-observation weight ceiling). Settings
//! load from and save to JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Compute back-end selected once at engine construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    /// Single-threaded host loops.
    Serial,
    /// rayon data-parallel host loops.
    #[default]
    Parallel,
}

/// What the pipeline does with a frame whose tracking was lost.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LostPolicy {
    /// Keep fusing at the last pose that tracked well.
    #[default]
    FuseAtLastGood,
    /// Skip integration until tracking recovers.
    FreezeFusion,
}

/// Meaning of an externally supplied pose seed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseConvention {
    /// Rotation/translation take camera coordinates to world coordinates.
    #[default]
    CameraToWorld,
    /// Rotation/translation take world coordinates to camera coordinates.
    WorldToCamera,
}

/// Which tracker implementation the engine builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Projective point-to-plane ICP against the previous raycast.
    #[default]
    DepthIcp,
    /// Poses come from the seed interface only.
    External,
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// TSDF parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneParams {
    /// Voxel edge length in meters.
    pub voxel_size: f32,
    /// Truncation band half-width (mu) in meters.
    pub mu: f32,
    /// Integration weight ceiling.
    pub max_w: u8,
    /// Depth readings nearer than this are ignored (meters).
    pub view_frustum_min: f32,
    /// Depth readings farther than this are ignored (meters).
    pub view_frustum_max: f32,
    /// Skip voxels whose weight already reached `max_w`.
    pub stop_integrating_at_max_w: bool,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            voxel_size: 0.005,
            mu: 0.02,
            max_w: 100,
            view_frustum_min: 0.2,
            view_frustum_max: 3.0,
            stop_integrating_at_max_w: false,
        }
    }
}

impl SceneParams {
    /// Edge length of one voxel block in meters.
    pub fn block_size_meters(&self) -> f32 {
        self.voxel_size * crate::voxel::BLOCK_SIZE as f32
    }
}

/// Hash index and block pool capacities.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HashParams {
    /// Number of ordered buckets. Must be a power of two.
    pub bucket_count: u32,
    /// Number of overflow entries shared by all buckets.
    pub excess_list_size: u32,
    /// Number of device-resident block slots.
    pub local_block_count: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self {
            bucket_count: 0x10_0000,
            excess_list_size: 0x2_0000,
            local_block_count: 0x8000,
        }
    }
}

/// Host/device residency parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapParams {
    /// Archive blocks to host memory instead of keeping all on device.
    pub enabled: bool,
    /// Device occupancy fraction above which invisible blocks are swapped out.
    pub low_water: f32,
    /// Upper bound on blocks moved host to device per frame.
    pub max_swap_in_per_frame: usize,
    /// Upper bound on blocks moved device to host per frame.
    pub max_swap_out_per_frame: usize,
    /// Extra frustum margin for the visibility re-check, as a fraction of
    /// image width/height. Anticipates camera motion.
    pub frustum_margin_fraction: f32,
    /// Host archive capacity in blocks. 0 sizes it to the hash table.
    pub host_block_capacity: u32,
}

impl Default for SwapParams {
    fn default() -> Self {
        Self {
            enabled: true,
            low_water: 0.75,
            max_swap_in_per_frame: 0x1000,
            max_swap_out_per_frame: 0x1000,
            frustum_margin_fraction: 0.125,
            host_block_capacity: 0,
        }
    }
}

/// Pose tracker parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    pub kind: TrackerKind,
    /// Gauss-Newton iterations per pyramid level, coarsest level first.
    pub iterations_coarse_to_fine: Vec<u32>,
    /// Correspondences farther apart than this (meters) are rejected.
    pub outlier_distance: f32,
    /// Fraction of valid live pixels that must find a correspondence.
    pub min_inlier_fraction: f32,
    /// RMS point-to-plane residual (meters) above which tracking is lost.
    pub max_residual: f32,
    /// Stop iterating once the update twist norm drops below this.
    pub convergence_threshold: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            kind: TrackerKind::DepthIcp,
            iterations_coarse_to_fine: vec![10, 5, 4],
            outlier_distance: 0.1,
            min_inlier_fraction: 0.2,
            max_residual: 0.02,
            convergence_threshold: 1e-5,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

/// Full engine configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub device: DeviceType,
    pub scene: SceneParams,
    pub hash: HashParams,
    pub swap: SwapParams,
    pub tracker: TrackerSettings,
    pub lost_policy: LostPolicy,
    /// 5x5 bilateral filter on the converted depth image.
    pub use_bilateral_filter: bool,
    /// Compute per-pixel depth normals and uncertainty.
    pub model_sensor_noise: bool,
    pub pose_seed_convention: PoseConvention,
    /// Treat the first seeded pose as the world origin.
    pub anchor_pose_seed_to_first: bool,
}

impl FusionSettings {
    /// Load settings from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let settings: FusionSettings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Write settings as pretty JSON.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Reject settings the data structures cannot honor.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scene;
        if !(s.voxel_size > 0.0) {
            return Err(Error::Config(format!("voxel_size must be positive, got {}", s.voxel_size)));
        }
        if s.mu < s.voxel_size {
            return Err(Error::Config(format!(
                "mu ({}) must be at least one voxel ({})",
                s.mu, s.voxel_size
            )));
        }
        if s.max_w == 0 {
            return Err(Error::Config("max_w must be at least 1".into()));
        }
        if !(s.view_frustum_min >= 0.0 && s.view_frustum_max > s.view_frustum_min) {
            return Err(Error::Config(format!(
                "invalid depth range [{}, {}]",
                s.view_frustum_min, s.view_frustum_max
            )));
        }
        let h = &self.hash;
        if h.bucket_count == 0 || !h.bucket_count.is_power_of_two() {
            return Err(Error::Config(format!("bucket_count must be a power of two, got {}", h.bucket_count)));
        }
        if h.local_block_count == 0 {
            return Err(Error::Config("local_block_count must be at least 1".into()));
        }
        if !(self.swap.low_water > 0.0 && self.swap.low_water <= 1.0) {
            return Err(Error::Config(format!("swap low_water must be in (0, 1], got {}", self.swap.low_water)));
        }
        if self.tracker.kind == TrackerKind::DepthIcp && self.tracker.iterations_coarse_to_fine.is_empty() {
            return Err(Error::Config("depth ICP needs at least one pyramid level".into()));
        }
        Ok(())
    }
}
