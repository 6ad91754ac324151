//! Tracking controller: runs the tracker, applies priors and decides
//! whether the frame's pose can be trusted

use crate::backend::ComputeBackend;
use crate::core::config::{LostPolicy, TrackerKind, TrackerSettings};
use crate::render::RenderState;
use crate::view::View;
use crate::voxel::Scene;
use super::external::ExternalTracker;
use super::icp::DepthIcpTracker;
use super::imu::{ImuCalibrator, ImuMeasurement};
use super::state::{Tracker, TrackingQuality, TrackingState, TrackingStatus};

pub struct TrackingController {
    tracker: Box<dyn Tracker>,
    settings: TrackerSettings,
    lost_policy: LostPolicy,
    imu: ImuCalibrator,
}

impl TrackingController {
    pub fn new(tracker: Box<dyn Tracker>, settings: TrackerSettings, lost_policy: LostPolicy) -> Self {
        log::info!("Tracker: {}, lost policy {:?}", tracker.name(), lost_policy);
        Self {
            tracker,
            settings,
            lost_policy,
            imu: ImuCalibrator::default(),
        }
    }

    /// Controller with the tracker `settings.kind` names
    pub fn from_settings(settings: TrackerSettings, lost_policy: LostPolicy, backend: &dyn ComputeBackend) -> Self {
        let tracker: Box<dyn Tracker> = match settings.kind {
            TrackerKind::DepthIcp => Box::new(DepthIcpTracker::new(settings.clone(), backend.dispatch())),
            TrackerKind::External => Box::new(ExternalTracker::new()),
        };
        Self::new(tracker, settings, lost_policy)
    }

    /// Estimate `state.pose_d` for `view` and update the tracking status.
    ///
    /// A lost frame reverts the pose to the last one that tracked well.
    pub fn track(&mut self, state: &mut TrackingState, view: &View, imu: Option<&ImuMeasurement>) -> TrackingStatus {
        if let Some(delta) = imu.and_then(|m| self.imu.update(m)) {
            state.pose_d = ImuCalibrator::apply(delta, &state.pose_d);
        }
        if let Some(age) = state.age_point_cloud.as_mut() {
            *age += 1;
        }

        if self.tracker.requires_reference() && !state.has_reference() {
            state.status = TrackingStatus::Idle;
            state.quality = TrackingQuality::default();
            state.last_good_pose = state.pose_d;
            return state.status;
        }

        self.tracker.update_initial_pose(state);
        let quality = self.tracker.track(state, view);
        state.quality = quality;

        if quality.is_good(&self.settings) {
            if state.status == TrackingStatus::Lost {
                log::info!("Tracking recovered");
            }
            state.status = TrackingStatus::Tracking;
            state.last_good_pose = state.pose_d;
        } else {
            if state.status != TrackingStatus::Lost {
                log::warn!(
                    "Tracking lost: {:.1}% inliers, residual {:.4} m",
                    quality.inlier_fraction * 100.0,
                    quality.residual
                );
            }
            state.status = TrackingStatus::Lost;
            state.pose_d = state.last_good_pose;
        }
        state.status
    }

    /// Check if the frame may be fused given its tracking status
    pub fn should_fuse(&self, status: TrackingStatus) -> bool {
        !(status == TrackingStatus::Lost && self.lost_policy == LostPolicy::FreezeFusion)
    }

    /// Raycast the scene at `state.pose_d` into `render_state` and turn the
    /// result into the next frame's reference surface. The caller fills
    /// `render_state.visible_entries` first.
    pub fn prepare(&self, backend: &dyn ComputeBackend, scene: &Scene, state: &mut TrackingState, view: &View, render_state: &mut RenderState) {
        let intrinsics = view.calib.depth;
        backend.create_expected_depths(scene, &state.pose_d, &intrinsics, render_state);
        backend.raycast(scene, &state.pose_d, &intrinsics, render_state);
        if self.tracker.requires_reference() {
            backend.create_icp_maps(scene, render_state, &mut state.point_cloud, &mut state.normals);
        }
        state.pose_point_cloud = state.pose_d;
        state.age_point_cloud = Some(0);
    }

    pub fn tracker_name(&self) -> &'static str {
        self.tracker.name()
    }

    pub fn lost_policy(&self) -> LostPolicy {
        self.lost_policy
    }

    pub fn reset_imu(&mut self) {
        self.imu.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SerialBackend;
    use crate::core::types::{Mat3, Vec3};
    use crate::math::Pose;
    use crate::tracking::icp::tests::{corner_reference, corner_view, SIZE};

    fn icp_controller(policy: LostPolicy) -> TrackingController {
        TrackingController::from_settings(TrackerSettings::default(), policy, &SerialBackend)
    }

    #[test]
    fn test_first_frame_is_idle() {
        let mut controller = icp_controller(LostPolicy::FuseAtLastGood);
        let mut state = TrackingState::new(SIZE);
        let status = controller.track(&mut state, &corner_view(&Pose::IDENTITY), None);
        assert_eq!(status, TrackingStatus::Idle);
        assert!(controller.should_fuse(status));
    }

    #[test]
    fn test_tracks_then_loses_and_reverts() {
        let mut controller = icp_controller(LostPolicy::FreezeFusion);
        let mut state = corner_reference();

        let moved = Pose::from_rt(Mat3::IDENTITY, Vec3::new(0.01, 0.0, 0.02));
        let status = controller.track(&mut state, &corner_view(&moved), None);
        assert_eq!(status, TrackingStatus::Tracking);
        let good = state.pose_d;
        assert_eq!(state.last_good_pose, good);

        // A view with no depth at all cannot be tracked
        let mut blank = corner_view(&moved);
        blank.depth.fill(0.0);
        let status = controller.track(&mut state, &blank, None);
        assert_eq!(status, TrackingStatus::Lost);
        assert_eq!(state.pose_d, good);
        assert!(!controller.should_fuse(status));
    }

    #[test]
    fn test_lost_policy_fuse_at_last_good() {
        let controller = icp_controller(LostPolicy::FuseAtLastGood);
        assert!(controller.should_fuse(TrackingStatus::Lost));
        assert_eq!(controller.lost_policy(), LostPolicy::FuseAtLastGood);
        assert_eq!(controller.tracker_name(), "depth_icp");
    }

    #[test]
    fn test_imu_prior_rotates_pose() {
        let mut settings = TrackerSettings::default();
        settings.kind = TrackerKind::External;
        let mut controller = TrackingController::from_settings(settings, LostPolicy::FuseAtLastGood, &SerialBackend);
        let mut state = TrackingState::new(SIZE);
        let view = corner_view(&Pose::IDENTITY);

        controller.track(&mut state, &view, Some(&ImuMeasurement { r: Mat3::IDENTITY }));
        assert_eq!(state.pose_d, Pose::IDENTITY);
        let status = controller.track(&mut state, &view, Some(&ImuMeasurement { r: Mat3::from_rotation_y(0.1) }));
        assert_eq!(status, TrackingStatus::Tracking);
        let expected = Pose::from_camera_to_world(Mat3::from_rotation_y(0.1), Vec3::ZERO);
        assert!(state.pose_d.approx_eq(&expected, 1e-3, 1e-6));
    }
}
