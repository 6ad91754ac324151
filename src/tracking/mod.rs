//! Camera pose tracking against the fused model

pub mod state;
pub mod icp;
pub mod external;
pub mod imu;
pub mod controller;
pub mod seed;

pub use state::{Tracker, TrackingQuality, TrackingState, TrackingStatus};
pub use icp::DepthIcpTracker;
pub use external::ExternalTracker;
pub use imu::{ImuCalibrator, ImuMeasurement};
pub use controller::TrackingController;
pub use seed::{PoseSeed, PoseSession};
