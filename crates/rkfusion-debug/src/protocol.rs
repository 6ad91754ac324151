//! Debug protocol - JSON command/response definitions
//!
//! One JSON object per line in each direction.

use serde::{Deserialize, Serialize};

/// Camera placement for free-viewpoint renders (camera to world)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Row-major rotation
    pub rotation: [[f32; 3]; 3],
    pub translation: [f32; 3],
}

/// Commands sent from a debug client to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum DebugCommand {
    /// Health check
    Ping,
    /// Size of the tracked image
    GetImageSize,
    /// Render or copy an image (returns base64 PNG).
    /// `kind`: original_rgb, original_depth, scene_raycast,
    /// free_camera_shaded, free_camera_colour_from_volume,
    /// free_camera_colour_from_normal
    GetImage {
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pose: Option<CameraPose>,
    },
    /// Turn TSDF integration on or off
    SetIntegration { enabled: bool },
    /// Turn everything after view building on or off
    SetMainProcessing { enabled: bool },
    /// Block pool and hash occupancy
    GetSceneStats,
    /// Tracking status, quality and camera pose
    GetTrackingState,
    /// Per-stage timings of the last frame and processing rate
    GetFrameStats,
    /// Extract a mesh and write it as binary STL
    SaveMesh { path: String },
    /// Write a compressed scene snapshot
    SaveSnapshot { path: String },
}

/// Responses from debug server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DebugResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants.
///
/// Untagged: a variant whose fields are a subset of another's must come after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    None,
    Pong { message: String },
    Image {
        width: u32,
        height: u32,
        png_base64: String,
    },
    ImageSize { width: u32, height: u32 },
    ParamsUpdated { description: String },
    SceneStats {
        pool_capacity: u32,
        used_slots: u32,
        device_entries: u32,
        archived_entries: u32,
        excess_used: u32,
        host_blocks: u32,
    },
    TrackingState {
        status: String,
        inlier_fraction: f32,
        residual: f32,
        camera_position: [f32; 3],
        has_reference: bool,
    },
    FrameStats {
        frame_count: u64,
        processing_fps: f32,
        view_ms: f32,
        tracking_ms: f32,
        fusion_ms: f32,
        raycast_ms: f32,
    },
    MeshSaved { path: String, triangle_count: u64 },
    SnapshotSaved { path: String },
}

impl DebugResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }

    pub fn updated(description: impl Into<String>) -> Self {
        Self::ok(ResponseData::ParamsUpdated {
            description: description.into(),
        })
    }
}
