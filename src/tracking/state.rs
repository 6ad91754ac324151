//! Tracking state shared between the tracker, the controller and the
//! raycaster that produces the reference surface

use serde::Serialize;

use crate::core::config::TrackerSettings;
use crate::core::types::{UVec2, Vec4};
use crate::math::Pose;
use crate::render::NO_NORMAL;
use crate::view::{ImageMap, View};

/// Tracking outcome of the most recent frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    /// No reference surface yet (first frame)
    #[default]
    Idle,
    Tracking,
    Lost,
}

/// How well the live depth agreed with the reference surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TrackingQuality {
    /// Fraction of valid live pixels that found a correspondence
    pub inlier_fraction: f32,
    /// RMS point-to-plane distance of the correspondences (meters)
    pub residual: f32,
}

impl TrackingQuality {
    /// Quality reported by trackers that do not measure anything
    pub const PERFECT: TrackingQuality = TrackingQuality {
        inlier_fraction: 1.0,
        residual: 0.0,
    };

    pub fn is_good(&self, settings: &TrackerSettings) -> bool {
        self.inlier_fraction >= settings.min_inlier_fraction && self.residual <= settings.max_residual
    }
}

/// Camera pose estimate plus the reference surface it is tracked against
pub struct TrackingState {
    /// Current world-to-camera pose of the depth camera
    pub pose_d: Pose,
    /// Pose the reference surface was raycast from
    pub pose_point_cloud: Pose,
    /// Reference surface points in world coordinates, w = 1 valid
    pub point_cloud: ImageMap<Vec4>,
    /// Reference surface normals in world coordinates, w = 1 valid
    pub normals: ImageMap<Vec4>,
    /// Frames since the reference was raycast, `None` before the first
    pub age_point_cloud: Option<u32>,
    pub status: TrackingStatus,
    /// Most recent pose that tracked well
    pub last_good_pose: Pose,
    pub quality: TrackingQuality,
}

impl TrackingState {
    pub fn new(size: UVec2) -> Self {
        Self {
            pose_d: Pose::IDENTITY,
            pose_point_cloud: Pose::IDENTITY,
            point_cloud: ImageMap::new(size.x, size.y, NO_NORMAL),
            normals: ImageMap::new(size.x, size.y, NO_NORMAL),
            age_point_cloud: None,
            status: TrackingStatus::Idle,
            last_good_pose: Pose::IDENTITY,
            quality: TrackingQuality::default(),
        }
    }

    /// Check if a reference surface is available
    pub fn has_reference(&self) -> bool {
        self.age_point_cloud.is_some()
    }

    /// Reset to `pose` with no reference
    pub fn reset(&mut self, pose: Pose) {
        self.pose_d = pose;
        self.pose_point_cloud = pose;
        self.last_good_pose = pose;
        self.age_point_cloud = None;
        self.status = TrackingStatus::Idle;
        self.quality = TrackingQuality::default();
        self.point_cloud.fill(NO_NORMAL);
        self.normals.fill(NO_NORMAL);
    }
}

/// Pose estimator. Refines `state.pose_d` from the live view.
pub trait Tracker: Send {
    /// Estimate the pose for `view` and report how well it fit
    fn track(&mut self, state: &mut TrackingState, view: &View) -> TrackingQuality;

    /// Hook to adjust the starting pose before tracking
    fn update_initial_pose(&mut self, _state: &mut TrackingState) {}

    /// Whether `track` needs a reference surface in `state`
    fn requires_reference(&self) -> bool;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        let settings = TrackerSettings::default();
        assert!(TrackingQuality::PERFECT.is_good(&settings));
        let sparse = TrackingQuality {
            inlier_fraction: 0.05,
            residual: 0.001,
        };
        assert!(!sparse.is_good(&settings));
        let noisy = TrackingQuality {
            inlier_fraction: 0.9,
            residual: 0.05,
        };
        assert!(!noisy.is_good(&settings));
    }

    #[test]
    fn test_reset_drops_reference() {
        let mut state = TrackingState::new(UVec2::new(4, 3));
        state.age_point_cloud = Some(3);
        state.status = TrackingStatus::Lost;
        let pose = Pose::from_translation(crate::core::types::Vec3::X);
        state.reset(pose);
        assert!(!state.has_reference());
        assert_eq!(state.status, TrackingStatus::Idle);
        assert_eq!(state.last_good_pose, pose);
    }
}
