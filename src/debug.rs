//! Debug-server handler exposing the engine's query surface

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, TryLockError};

use rkfusion_debug::{encode_png_base64, CameraPose, DebugCommand, DebugHandler, DebugResponse, ResponseData};

use crate::core::types::{Mat3, Vec3};
use crate::engine::{FusionEngine, ImageKind};
use crate::math::Pose;

/// Answers debug commands against an engine shared with the frame loop
pub struct EngineDebugHandler {
    engine: Arc<StdMutex<FusionEngine>>,
}

impl EngineDebugHandler {
    pub fn new(engine: Arc<StdMutex<FusionEngine>>) -> Self {
        Self { engine }
    }

    /// Fails fast with a "busy" error while the frame loop holds the engine
    fn lock(&self) -> Result<MutexGuard<'_, FusionEngine>, DebugResponse> {
        self.engine.try_lock().map_err(|e| match e {
            TryLockError::WouldBlock => DebugResponse::error("engine busy processing a frame, retry"),
            TryLockError::Poisoned(_) => DebugResponse::error("engine lock poisoned"),
        })
    }

    fn dispatch(&mut self, cmd: DebugCommand) -> Result<DebugResponse, DebugResponse> {
        Ok(match cmd {
            DebugCommand::Ping => DebugResponse::pong(),

            DebugCommand::GetImageSize => {
                let size = self.lock()?.image_size();
                DebugResponse::ok(ResponseData::ImageSize {
                    width: size.x,
                    height: size.y,
                })
            }

            DebugCommand::GetImage { kind, pose } => {
                let kind: ImageKind = serde_json::from_value(serde_json::Value::String(kind.clone()))
                    .map_err(|_| DebugResponse::error(format!("unknown image kind: {}", kind)))?;
                let pose = pose.as_ref().map(camera_pose);
                let image = self
                    .lock()?
                    .get_image(kind, pose.as_ref(), None)
                    .ok_or_else(|| DebugResponse::error("no frame processed yet"))?;
                let (width, height) = image.dimensions();
                let png_base64 = encode_png_base64(width, height, image.as_raw())
                    .map_err(|e| DebugResponse::error(e.to_string()))?;
                DebugResponse::ok(ResponseData::Image {
                    width,
                    height,
                    png_base64,
                })
            }

            DebugCommand::SetIntegration { enabled } => {
                let mut engine = self.lock()?;
                if enabled {
                    engine.turn_on_integration();
                } else {
                    engine.turn_off_integration();
                }
                DebugResponse::updated(format!("integration {}", if enabled { "on" } else { "off" }))
            }

            DebugCommand::SetMainProcessing { enabled } => {
                let mut engine = self.lock()?;
                if enabled {
                    engine.turn_on_main_processing();
                } else {
                    engine.turn_off_main_processing();
                }
                DebugResponse::updated(format!("main processing {}", if enabled { "on" } else { "off" }))
            }

            DebugCommand::GetSceneStats => {
                let engine = self.lock()?;
                let stats = engine.scene_stats();
                DebugResponse::ok(ResponseData::SceneStats {
                    pool_capacity: stats.pool_capacity,
                    used_slots: stats.used_slots,
                    device_entries: stats.device_entries,
                    archived_entries: stats.archived_entries,
                    excess_used: stats.excess_used,
                    host_blocks: engine.host_block_count() as u32,
                })
            }

            DebugCommand::GetTrackingState => {
                let engine = self.lock()?;
                let state = engine.tracking_state();
                let status = serde_json::to_value(state.status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_owned))
                    .unwrap_or_default();
                DebugResponse::ok(ResponseData::TrackingState {
                    status,
                    inlier_fraction: state.quality.inlier_fraction,
                    residual: state.quality.residual,
                    camera_position: state.pose_d.camera_center().to_array(),
                    has_reference: state.has_reference(),
                })
            }

            DebugCommand::GetFrameStats => {
                let engine = self.lock()?;
                let timer = engine.timer();
                let last = timer.last();
                DebugResponse::ok(ResponseData::FrameStats {
                    frame_count: timer.frame_count(),
                    processing_fps: timer.processing_fps(),
                    view_ms: last.view_ms,
                    tracking_ms: last.tracking_ms,
                    fusion_ms: last.fusion_ms,
                    raycast_ms: last.raycast_ms,
                })
            }

            DebugCommand::SaveMesh { path } => {
                let triangles = self
                    .lock()?
                    .save_scene_to_mesh(&path)
                    .map_err(|e| DebugResponse::error(e.to_string()))?;
                DebugResponse::ok(ResponseData::MeshSaved {
                    path,
                    triangle_count: triangles as u64,
                })
            }

            DebugCommand::SaveSnapshot { path } => {
                self.lock()?
                    .save_snapshot(&path)
                    .map_err(|e| DebugResponse::error(e.to_string()))?;
                DebugResponse::ok(ResponseData::SnapshotSaved { path })
            }
        })
    }
}

impl DebugHandler for EngineDebugHandler {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse {
        self.dispatch(cmd).unwrap_or_else(|err| err)
    }
}

/// World-to-camera pose from a camera-to-world wire pose
fn camera_pose(p: &CameraPose) -> Pose {
    let rows = p.rotation.map(Vec3::from_array);
    let rotation = Mat3::from_cols(rows[0], rows[1], rows[2]).transpose();
    Pose::from_camera_to_world(rotation, Vec3::from_array(p.translation))
}
