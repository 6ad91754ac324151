//! Orientation priors from an IMU

use serde::{Deserialize, Serialize};

use crate::core::types::Mat3;
use crate::math::Pose;

/// Absolute orientation reported by the IMU (IMU to world rotation)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImuMeasurement {
    pub r: Mat3,
}

/// Turns a stream of absolute IMU orientations into frame-to-frame
/// rotations of the depth camera
pub struct ImuCalibrator {
    /// Rotation taking camera coordinates to IMU coordinates
    camera_to_imu: Mat3,
    /// Camera-to-world rotation implied by the previous measurement
    previous: Option<Mat3>,
}

impl ImuCalibrator {
    pub fn new(camera_to_imu: Mat3) -> Self {
        Self {
            camera_to_imu,
            previous: None,
        }
    }

    /// Feed a measurement. Returns the world-to-camera rotation change since
    /// the previous measurement; `None` for the first one.
    pub fn update(&mut self, m: &ImuMeasurement) -> Option<Mat3> {
        let current = m.r * self.camera_to_imu;
        let delta = self.previous.map(|prev| current.transpose() * prev);
        self.previous = Some(current);
        delta
    }

    /// Rotate a world-to-camera pose about its own center by `delta`
    pub fn apply(delta: Mat3, pose: &Pose) -> Pose {
        let mut out = Pose::from_rt(delta, crate::core::types::Vec3::ZERO) * *pose;
        out.coerce();
        out
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

impl Default for ImuCalibrator {
    fn default() -> Self {
        Self::new(Mat3::IDENTITY)
    }
}
