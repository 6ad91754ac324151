//! Pipeline orchestrator
//!
//! [`FusionEngine`] owns the scene, the residency manager, the tracker and
//! the render states, and runs one frame at a time:
//! view → tracking → allocation/visibility → swap → integration → raycast.

use std::path::Path;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::backend::{create_backend, ComputeBackend};
use crate::core::config::{FusionSettings, TrackerKind};
use crate::core::time::{FrameTimer, Stage, StageTimings};
use crate::core::types::{IVec3, Result, UVec2};
use crate::fusion::{find_visible_blocks, AllocationParams, AllocationStats, ViewFrustum, VisibilityList};
use crate::math::Pose;
use crate::mesh::{self, Mesh};
use crate::render::{RenderKind, RenderState};
use crate::streaming::{self, Residency, SwapManager, SwapStats};
use crate::tracking::{
    ImuMeasurement, PoseSeed, PoseSession, TrackingController, TrackingQuality, TrackingState, TrackingStatus,
};
use crate::view::{visualize, DepthInput, Intrinsics, RgbdCalib, View, ViewOptions};
use crate::voxel::{Scene, SceneStats};

/// Images the engine can produce
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    OriginalRgb,
    /// Depth as false color, or its uncertainty when sensor noise is modelled
    OriginalDepth,
    /// Shaded raycast at the tracked pose
    SceneRaycast,
    FreeCameraShaded,
    FreeCameraColourFromVolume,
    FreeCameraColourFromNormal,
}

impl ImageKind {
    fn free_camera_render(self) -> Option<RenderKind> {
        match self {
            ImageKind::FreeCameraShaded => Some(RenderKind::Shaded),
            ImageKind::FreeCameraColourFromVolume => Some(RenderKind::ColourFromVolume),
            ImageKind::FreeCameraColourFromNormal => Some(RenderKind::ColourFromNormal),
            _ => None,
        }
    }
}

/// What happened to one frame
#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    /// False when main processing is off and only the view was built
    pub processed: bool,
    pub tracking_status: TrackingStatus,
    pub tracking_quality: TrackingQuality,
    /// World-to-camera pose the frame was fused at
    pub pose: Pose,
    /// Motion since the previous seeded pose, on seeded frames only
    pub relative_motion: Option<Pose>,
    pub fused: bool,
    pub visible_blocks: usize,
    pub allocation: AllocationStats,
    pub swap: SwapStats,
    pub timings: StageTimings,
}

/// Real-time RGB-D fusion pipeline
pub struct FusionEngine {
    settings: FusionSettings,
    scene: Scene,
    swap: Option<SwapManager>,
    backend: Box<dyn ComputeBackend>,
    view: View,
    view_options: ViewOptions,
    has_view: bool,
    tracking: TrackingState,
    controller: TrackingController,
    live: RenderState,
    free_view: Option<RenderState>,
    visible: VisibilityList,
    session: PoseSession,
    timer: FrameTimer,
    fusion_active: bool,
    main_processing_active: bool,
    frame_index: u64,
}

impl FusionEngine {
    pub fn new(settings: FusionSettings, calib: RgbdCalib, rgb_size: UVec2, depth_size: UVec2) -> Result<Self> {
        settings.validate()?;
        let backend = create_backend(settings.device);
        let scene = Scene::new(settings.scene.clone(), &settings.hash);
        let swap = Self::make_swap(&settings, &scene);
        let controller = TrackingController::from_settings(settings.tracker.clone(), settings.lost_policy, backend.as_ref());

        let view_options = ViewOptions {
            use_bilateral_filter: settings.use_bilateral_filter,
            model_sensor_noise: settings.model_sensor_noise,
            depth_range: (settings.scene.view_frustum_min, settings.scene.view_frustum_max),
        };
        let view = View::new(calib.clone(), rgb_size, depth_size, settings.model_sensor_noise);
        let tracking = TrackingState::new(depth_size);
        let live = RenderState::new(depth_size, calib.depth);

        log::info!(
            "Fusion engine: rgb {}x{}, depth {}x{}, swap {}, tracker {} ({:?} when lost)",
            rgb_size.x,
            rgb_size.y,
            depth_size.x,
            depth_size.y,
            if swap.is_some() { "on" } else { "off" },
            controller.tracker_name(),
            controller.lost_policy()
        );
        Ok(Self {
            session: PoseSession::new(settings.anchor_pose_seed_to_first),
            settings,
            scene,
            swap,
            backend,
            view,
            view_options,
            has_view: false,
            tracking,
            controller,
            live,
            free_view: None,
            visible: VisibilityList::new(),
            timer: FrameTimer::new(),
            fusion_active: true,
            main_processing_active: true,
            frame_index: 0,
        })
    }

    fn make_swap(settings: &FusionSettings, scene: &Scene) -> Option<SwapManager> {
        settings.swap.enabled.then(|| {
            SwapManager::new(settings.swap.clone(), scene.hash().entry_count(), scene.pool().capacity())
        })
    }

    /// Run the pipeline on one frame.
    ///
    /// A `pose_seed` bypasses the tracker for this frame. A failed block
    /// transfer aborts the frame before integration.
    pub fn process_frame(
        &mut self,
        rgb: &RgbaImage,
        depth: &DepthInput<'_>,
        imu: Option<&ImuMeasurement>,
        pose_seed: Option<&PoseSeed>,
    ) -> Result<FrameReport> {
        self.timer.begin_frame();
        self.timer.begin_stage(Stage::View);
        let built = self.backend.build_view(&mut self.view, rgb, depth, &self.view_options);
        self.timer.end_stage(Stage::View);
        built?;
        self.has_view = true;

        let frame_index = self.frame_index;
        self.frame_index += 1;

        if !self.main_processing_active {
            return Ok(FrameReport {
                frame_index,
                processed: false,
                tracking_status: self.tracking.status,
                tracking_quality: self.tracking.quality,
                pose: self.tracking.pose_d,
                relative_motion: None,
                fused: false,
                visible_blocks: 0,
                allocation: AllocationStats::default(),
                swap: SwapStats::default(),
                timings: self.timer.end_frame(),
            });
        }

        self.timer.begin_stage(Stage::Tracking);
        let mut relative_motion = None;
        let status = match pose_seed {
            Some(seed) => {
                let pose = self.session.resolve(seed, self.settings.pose_seed_convention);
                relative_motion = self.session.relative_motion();
                self.tracking.pose_d = pose;
                self.tracking.last_good_pose = pose;
                self.tracking.status = TrackingStatus::Tracking;
                self.tracking.quality = TrackingQuality::PERFECT;
                TrackingStatus::Tracking
            }
            None => self.controller.track(&mut self.tracking, &self.view, imu),
        };
        self.timer.end_stage(Stage::Tracking);
        let pose = self.tracking.pose_d;

        let mut allocation = AllocationStats::default();
        let mut swap_stats = SwapStats::default();
        let fused = self.fusion_active && self.controller.should_fuse(status);
        if fused {
            self.timer.begin_stage(Stage::Fusion);
            let params = self.allocation_params();
            let (visible, stats) = self.backend.allocate_and_find_visible(
                &mut self.scene,
                &self.view,
                &pose,
                &self.visible,
                &params,
            );
            allocation = stats;
            self.visible = visible;

            if let Some(swap) = self.swap.as_mut() {
                swap.begin_frame(&self.visible);
                swap_stats = match self.backend.swap(swap, &mut self.scene, &self.visible) {
                    Ok(stats) => stats,
                    Err(e) => {
                        self.timer.end_stage(Stage::Fusion);
                        self.timer.end_frame();
                        return Err(e);
                    }
                };
            }

            self.backend.integrate(&mut self.scene, &self.view, &pose, &self.visible);
            self.timer.end_stage(Stage::Fusion);

            let scene = &self.scene;
            self.live.visible_entries = self
                .visible
                .entries()
                .iter()
                .copied()
                .filter(|e| scene.entry(*e).ptr.slot().is_some())
                .collect();
        } else {
            self.live.visible_entries = self.blocks_in_view(&pose, &self.view.calib.depth);
        }

        self.timer.begin_stage(Stage::Raycast);
        self.controller
            .prepare(self.backend.as_ref(), &self.scene, &mut self.tracking, &self.view, &mut self.live);
        self.timer.end_stage(Stage::Raycast);

        let report = FrameReport {
            frame_index,
            processed: true,
            tracking_status: status,
            tracking_quality: self.tracking.quality,
            pose,
            relative_motion,
            fused,
            visible_blocks: self.visible.len(),
            allocation,
            swap: swap_stats,
            timings: self.timer.end_frame(),
        };
        log::debug!(
            "Frame {}: {:?}, {} visible, {} new blocks, {:.1} ms",
            frame_index,
            status,
            report.visible_blocks,
            allocation.fresh_allocations,
            report.timings.total_ms()
        );
        Ok(report)
    }

    fn allocation_params(&self) -> AllocationParams {
        let scene = self.scene.params();
        let margin_px = if self.swap.is_some() {
            self.settings.swap.frustum_margin_fraction * self.view.depth.width() as f32
        } else {
            0.0
        };
        AllocationParams {
            mu: scene.mu,
            block_size: scene.block_size_meters(),
            margin_px,
            near: scene.view_frustum_min,
            far: scene.view_frustum_max,
        }
    }

    fn blocks_in_view(&self, pose: &Pose, intrinsics: &Intrinsics) -> Vec<u32> {
        find_visible_blocks(
            &self.scene,
            &ViewFrustum {
                pose: *pose,
                intrinsics: *intrinsics,
                size: self.live.size(),
                near: self.settings.scene.view_frustum_min,
                far: self.settings.scene.view_frustum_max,
                margin_px: 0.0,
            },
        )
    }

    /// Size of the tracked (raycast) image
    pub fn image_size(&self) -> UVec2 {
        self.live.size()
    }

    /// Render or copy an image. Free-camera kinds use `pose` and
    /// `intrinsics`, defaulting to the tracked camera. `None` before the
    /// first frame.
    pub fn get_image(&mut self, kind: ImageKind, pose: Option<&Pose>, intrinsics: Option<&Intrinsics>) -> Option<RgbaImage> {
        if !self.has_view {
            return None;
        }
        match kind {
            ImageKind::OriginalRgb => Some(self.view.rgb.clone()),
            ImageKind::OriginalDepth => Some(match (&self.view.depth_uncertainty, self.settings.model_sensor_noise) {
                (Some(uncertainty), true) => visualize::uncertainty_to_rgba(uncertainty),
                _ => visualize::depth_to_rgba(&self.view.depth),
            }),
            ImageKind::SceneRaycast => {
                self.backend.render_image(&self.scene, RenderKind::Shaded, &mut self.live);
                Some(self.live.image.clone())
            }
            _ => {
                let render = kind.free_camera_render()?;
                let pose = pose.copied().unwrap_or(self.tracking.pose_d);
                let k = intrinsics.copied().unwrap_or(self.view.calib.depth);
                let visible = self.blocks_in_view(&pose, &k);
                let size = self.live.size();
                let state = self.free_view.get_or_insert_with(|| {
                    log::debug!("Creating free-view render state {}x{}", size.x, size.y);
                    RenderState::new(size, k)
                });
                state.visible_entries = visible;
                self.backend.create_expected_depths(&self.scene, &pose, &k, state);
                self.backend.raycast(&self.scene, &pose, &k, state);
                self.backend.render_image(&self.scene, render, state);
                Some(state.image.clone())
            }
        }
    }

    pub fn turn_on_integration(&mut self) {
        self.fusion_active = true;
    }

    pub fn turn_off_integration(&mut self) {
        self.fusion_active = false;
    }

    pub fn turn_on_main_processing(&mut self) {
        self.main_processing_active = true;
    }

    pub fn turn_off_main_processing(&mut self) {
        self.main_processing_active = false;
    }

    pub fn is_integration_on(&self) -> bool {
        self.fusion_active
    }

    pub fn is_main_processing_on(&self) -> bool {
        self.main_processing_active
    }

    /// Extract a mesh from every block on device or in the host archive
    pub fn update_mesh(&self) -> Mesh {
        mesh::extract_mesh(self.backend.dispatch(), &self.scene, self.swap.as_ref().map(|s| s.host()))
    }

    /// Extract a mesh and write it as binary STL. Returns the triangle count.
    pub fn save_scene_to_mesh(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mesh = self.update_mesh();
        mesh::write_stl(path.as_ref(), &mesh)?;
        Ok(mesh.triangle_count())
    }

    /// Write every block, device and host, to a compressed snapshot
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = streaming::capture(&self.scene, self.swap.as_ref().map(|s| s.host()));
        streaming::save_snapshot(path, &snapshot)
    }

    /// Replace the scene with a snapshot. Tracking restarts from the
    /// current pose.
    pub fn load_snapshot(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = streaming::load_snapshot(path)?;
        let mut scene = Scene::new(self.settings.scene.clone(), &self.settings.hash);
        let mut swap = Self::make_swap(&self.settings, &scene);
        streaming::restore(&snapshot, &mut scene, swap.as_mut().map(|s| s.host_mut()))?;
        if let Some(swap) = swap.as_mut() {
            swap.sync_budget(&scene);
        }
        self.scene = scene;
        self.swap = swap;
        self.visible.clear();
        self.live.visible_entries.clear();
        let pose = self.tracking.pose_d;
        self.tracking.reset(pose);
        log::info!("Loaded snapshot with {} blocks", snapshot.blocks.len());
        Ok(())
    }

    /// Drop all fused content and tracking history
    pub fn reset_scene(&mut self) {
        self.scene = Scene::new(self.settings.scene.clone(), &self.settings.hash);
        self.swap = Self::make_swap(&self.settings, &self.scene);
        self.visible.clear();
        self.live.visible_entries.clear();
        self.tracking.reset(Pose::IDENTITY);
        self.session.reset();
        self.controller.reset_imu();
        log::info!("Scene reset");
    }

    pub fn scene_stats(&self) -> SceneStats {
        self.scene.stats()
    }

    /// Where the block at `addr` currently lives
    pub fn residency(&self, addr: IVec3) -> Residency {
        streaming::residency(&self.scene, self.swap.as_ref(), addr)
    }

    /// Blocks held in the host archive, 0 without swapping
    pub fn host_block_count(&self) -> usize {
        self.swap.as_ref().map_or(0, |s| s.host().len())
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn tracking_state(&self) -> &TrackingState {
        &self.tracking
    }

    pub fn live_render_state(&self) -> &RenderState {
        &self.live
    }

    pub fn settings(&self) -> &FusionSettings {
        &self.settings
    }

    pub fn tracker_kind(&self) -> TrackerKind {
        self.settings.tracker.kind
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_index
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{DeviceType, HashParams, PoseConvention, SceneParams};
    use crate::core::error::Error;
    use crate::core::types::{Mat3, Vec3};
    use crate::render::hit_at;
    use image::{ImageBuffer, Luma, Rgba};

    const W: u32 = 32;
    const H: u32 = 24;

    fn test_settings(device: DeviceType) -> FusionSettings {
        let mut settings = FusionSettings {
            device,
            scene: SceneParams {
                voxel_size: 0.01,
                mu: 0.04,
                ..Default::default()
            },
            hash: HashParams {
                bucket_count: 0x1000,
                excess_list_size: 0x400,
                local_block_count: 0x1000,
            },
            ..Default::default()
        };
        settings.tracker.kind = TrackerKind::External;
        settings
    }

    fn engine(settings: FusionSettings) -> FusionEngine {
        let calib = RgbdCalib::aligned(Intrinsics::new(40.0, 40.0, 16.0, 12.0));
        FusionEngine::new(settings, calib, UVec2::new(W, H), UVec2::new(W, H)).unwrap()
    }

    fn plane_frame(depth: f32) -> (RgbaImage, ImageBuffer<Luma<f32>, Vec<f32>>) {
        (
            RgbaImage::from_pixel(W, H, Rgba([180, 120, 60, 255])),
            ImageBuffer::from_pixel(W, H, Luma([depth])),
        )
    }

    fn run(engine: &mut FusionEngine, depth: f32, frames: usize) -> FrameReport {
        let (rgb, d) = plane_frame(depth);
        let mut last = None;
        for _ in 0..frames {
            last = Some(engine.process_frame(&rgb, &DepthInput::Meters(&d), None, None).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn test_plane_raycasts_to_its_depth() {
        let mut engine = engine(test_settings(DeviceType::Parallel));
        let report = run(&mut engine, 2.0, 3);
        assert!(report.fused);
        assert!(report.visible_blocks > 0);
        assert_eq!(report.tracking_status, TrackingStatus::Tracking);

        let hit = hit_at(engine.live_render_state(), W / 2, H / 2).unwrap();
        assert!((hit.z - 2.0).abs() <= 0.01, "hit at {hit}");
    }

    #[test]
    fn test_never_visible_block_stays_unallocated() {
        let mut engine = engine(test_settings(DeviceType::Parallel));
        let behind = IVec3::new(0, 0, -20);
        run(&mut engine, 2.0, 100);
        assert_eq!(engine.residency(behind), Residency::Unallocated);
        assert_eq!(engine.frame_count(), 100);
    }

    #[test]
    fn test_integration_off_keeps_slot_count() {
        let mut engine = engine(test_settings(DeviceType::Serial));
        run(&mut engine, 2.0, 2);
        let used = engine.scene_stats().used_slots;
        assert!(used > 0);

        engine.turn_off_integration();
        for depth in [1.5, 1.0] {
            let report = run(&mut engine, depth, 5);
            assert!(!report.fused);
        }
        assert_eq!(engine.scene_stats().used_slots, used);

        engine.turn_on_integration();
        run(&mut engine, 1.0, 1);
        assert!(engine.scene_stats().used_slots > used);
    }

    #[test]
    fn test_raycast_matches_across_backends() {
        let mut serial = engine(test_settings(DeviceType::Serial));
        let mut parallel = engine(test_settings(DeviceType::Parallel));
        run(&mut serial, 1.8, 2);
        run(&mut parallel, 1.8, 2);
        assert_eq!(serial.live_render_state().raycast.data(), parallel.live_render_state().raycast.data());
        assert_eq!(
            serial.get_image(ImageKind::SceneRaycast, None, None),
            parallel.get_image(ImageKind::SceneRaycast, None, None)
        );
    }

    #[test]
    fn test_main_processing_off_only_builds_view() {
        let mut engine = engine(test_settings(DeviceType::Serial));
        engine.turn_off_main_processing();
        let report = run(&mut engine, 2.0, 1);
        assert!(!report.processed);
        assert_eq!(engine.scene_stats().used_slots, 0);
        assert!(engine.get_image(ImageKind::OriginalRgb, None, None).is_some());
    }

    #[test]
    fn test_mismatched_input_is_rejected() {
        let mut engine = engine(test_settings(DeviceType::Serial));
        let rgb = RgbaImage::new(W, H);
        let depth: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::new(W / 2, H);
        let err = engine.process_frame(&rgb, &DepthInput::Meters(&depth), None, None);
        assert!(matches!(err, Err(Error::Input(_))));
    }

    #[test]
    fn test_images() {
        let mut engine = engine(test_settings(DeviceType::Parallel));
        assert!(engine.get_image(ImageKind::OriginalDepth, None, None).is_none());
        run(&mut engine, 2.0, 2);

        for kind in [ImageKind::OriginalRgb, ImageKind::OriginalDepth, ImageKind::SceneRaycast] {
            let img = engine.get_image(kind, None, None).unwrap();
            assert_eq!(img.dimensions(), (W, H));
        }
        let colour = engine.get_image(ImageKind::FreeCameraColourFromVolume, None, None).unwrap();
        let [r, g, b, _] = colour.get_pixel(W / 2, H / 2).0;
        assert!(r > g && g > b, "{:?}", [r, g, b]);

        // Looking away from the plane renders nothing
        let away = Pose::from_camera_to_world(Mat3::from_rotation_y(std::f32::consts::PI), Vec3::ZERO);
        let img = engine.get_image(ImageKind::FreeCameraShaded, Some(&away), None).unwrap();
        assert!(img.pixels().all(|p| p.0[..3] == [0, 0, 0]));
    }

    #[test]
    fn test_pose_seed_drives_fusion_pose() {
        let mut settings = test_settings(DeviceType::Serial);
        settings.pose_seed_convention = PoseConvention::CameraToWorld;
        let mut engine = engine(settings);
        let (rgb, d) = plane_frame(2.0);
        let seed = PoseSeed {
            rotation: Mat3::IDENTITY,
            translation: Vec3::new(0.0, 0.0, 0.5),
        };
        let report = engine.process_frame(&rgb, &DepthInput::Meters(&d), None, Some(&seed)).unwrap();
        assert_eq!(report.tracking_status, TrackingStatus::Tracking);
        assert!((report.pose.camera_center() - seed.translation).length() < 1e-5);
        assert!(report.relative_motion.is_none());

        let hit = hit_at(engine.live_render_state(), W / 2, H / 2).unwrap();
        assert!((hit.z - 2.5).abs() <= 0.01, "hit at {hit}");

        // Stepping back 10 cm moves world points 10 cm further from the camera
        let closer = PoseSeed {
            rotation: Mat3::IDENTITY,
            translation: Vec3::new(0.0, 0.0, 0.4),
        };
        let report = engine.process_frame(&rgb, &DepthInput::Meters(&d), None, Some(&closer)).unwrap();
        let motion = report.relative_motion.unwrap();
        assert!(motion.approx_eq(&Pose::from_translation(Vec3::new(0.0, 0.0, 0.1)), 1e-4, 1e-5), "{motion:?}");

        // Tracker-driven frames report no seeded motion
        let report = engine.process_frame(&rgb, &DepthInput::Meters(&d), None, None).unwrap();
        assert!(report.relative_motion.is_none());
    }

    fn seeded(engine: &mut FusionEngine, depth: f32, seed: &PoseSeed) -> FrameReport {
        let (rgb, d) = plane_frame(depth);
        engine.process_frame(&rgb, &DepthInput::Meters(&d), None, Some(seed)).unwrap()
    }

    #[test]
    fn test_turning_away_swaps_out_and_back_in() {
        let mut settings = test_settings(DeviceType::Parallel);
        settings.hash.local_block_count = 400;
        settings.swap.low_water = 0.3;
        let mut engine = engine(settings);
        let front = PoseSeed {
            rotation: Mat3::IDENTITY,
            translation: Vec3::ZERO,
        };
        let back = PoseSeed {
            rotation: Mat3::from_rotation_y(std::f32::consts::PI),
            translation: Vec3::ZERO,
        };

        assert!(seeded(&mut engine, 1.0, &front).fused);
        let front_block = IVec3::new(0, 0, 12);
        assert_eq!(engine.residency(front_block), Residency::Device);

        let report = seeded(&mut engine, 1.0, &back);
        assert!(report.swap.swapped_out > 0, "{:?}", report.swap);
        for _ in 0..2 {
            seeded(&mut engine, 1.0, &back);
        }
        assert!(engine.host_block_count() > 0);

        let report = seeded(&mut engine, 1.0, &front);
        assert!(report.swap.swapped_in > 0, "{:?}", report.swap);
        assert_eq!(engine.residency(front_block), Residency::Device);
        let hit = hit_at(engine.live_render_state(), W / 2, H / 2).unwrap();
        assert!((hit.z - 1.0).abs() <= 0.01, "hit at {hit}");
    }

    #[test]
    fn test_snapshot_and_mesh_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = engine(test_settings(DeviceType::Parallel));
        run(&mut source, 2.0, 2);
        let stats = source.scene_stats();

        let triangles = source.save_scene_to_mesh(dir.path().join("scene.stl")).unwrap();
        assert!(triangles > 0);

        let path = dir.path().join("scene.snap");
        source.save_snapshot(&path).unwrap();
        let mut target = engine(test_settings(DeviceType::Parallel));
        target.load_snapshot(&path).unwrap();
        assert_eq!(target.scene_stats().device_entries, stats.device_entries);
        assert_eq!(target.update_mesh().triangle_count(), triangles);
        assert!(!target.tracking_state().has_reference());
    }
}
