//! Per-frame input: calibration, image maps and view building

pub mod image;
pub mod calib;
pub mod builder;
pub mod visualize;

pub use self::image::ImageMap;
pub use calib::{DisparityCalib, Intrinsics, RgbdCalib};
pub use builder::{build_view, DepthInput, View, ViewOptions};
