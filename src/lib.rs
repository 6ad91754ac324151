//! rkfusion - real-time dense RGB-D fusion on a hashed voxel-block TSDF

pub mod core;
pub mod math;
pub mod view;
pub mod voxel;
pub mod streaming;
pub mod fusion;
pub mod render;
pub mod tracking;
pub mod backend;
pub mod mesh;
pub mod engine;
pub mod debug;

pub use crate::core::{Error, Result};
pub use crate::core::config::FusionSettings;
pub use engine::{FrameReport, FusionEngine, ImageKind};
