//! Externally supplied poses and the session state that anchors them

use serde::{Deserialize, Serialize};

use crate::core::config::PoseConvention;
use crate::core::error::Error;
use crate::core::types::{Mat3, Result, Vec3};
use crate::math::Pose;

/// Camera pose from an external source of truth, consumed once per frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseSeed {
    pub rotation: Mat3,
    pub translation: Vec3,
}

impl PoseSeed {
    /// World-to-camera pose under `convention`
    pub fn to_pose(&self, convention: PoseConvention) -> Pose {
        let mut pose = match convention {
            PoseConvention::CameraToWorld => Pose::from_camera_to_world(self.rotation, self.translation),
            PoseConvention::WorldToCamera => Pose::from_rt(self.rotation, self.translation),
        };
        pose.coerce();
        pose
    }

    /// Parse twelve whitespace-separated numbers: the rotation row by row,
    /// then the translation
    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split_whitespace()
            .map(|s| s.parse::<f32>().map_err(|e| Error::Input(format!("pose value {s:?}: {e}"))))
            .collect::<Result<Vec<f32>>>()?;
        if values.len() != 12 {
            return Err(Error::Input(format!("pose needs 12 values, got {}", values.len())));
        }
        let row = |i: usize| Vec3::new(values[i * 3], values[i * 3 + 1], values[i * 3 + 2]);
        Ok(Self {
            rotation: Mat3::from_cols(row(0), row(1), row(2)).transpose(),
            translation: row(3),
        })
    }
}

/// Session pose state: the anchor that defines the world frame and the
/// last resolved pose
#[derive(Clone, Debug, Default)]
pub struct PoseSession {
    anchor_to_first: bool,
    first: Option<Pose>,
    last: Option<Pose>,
    relative: Option<Pose>,
}

impl PoseSession {
    pub fn new(anchor_to_first: bool) -> Self {
        Self {
            anchor_to_first,
            ..Default::default()
        }
    }

    /// World-to-camera pose for `seed`. With anchoring the first seed
    /// becomes the world origin and later seeds are expressed relative to it.
    pub fn resolve(&mut self, seed: &PoseSeed, convention: PoseConvention) -> Pose {
        let raw = seed.to_pose(convention);
        let mut pose = if self.anchor_to_first {
            let first = *self.first.get_or_insert(raw);
            raw * first.inverse()
        } else {
            raw
        };
        pose.coerce();

        self.relative = self.last.map(|last| {
            let mut rel = pose * last.inverse();
            rel.coerce();
            rel
        });
        self.last = Some(pose);
        pose
    }

    /// Motion between the two most recent resolved poses
    pub fn relative_motion(&self) -> Option<Pose> {
        self.relative
    }

    pub fn last_pose(&self) -> Option<Pose> {
        self.last
    }

    pub fn reset(&mut self) {
        self.first = None;
        self.last = None;
        self.relative = None;
    }
}
