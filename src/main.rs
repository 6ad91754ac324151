//! rkfusion demo driver
//!
//! Fuses either a synthetic sequence or a directory of recorded frames,
//! optionally serving the debug protocol while it runs.
//!
//! ```text
//! rkfusion [--settings s.json] [--calib c.json] [--frames DIR] [--poses DIR]
//!          [--synthetic N] [--mesh out.stl] [--snapshot out.snap]
//!          [--debug] [--port P] [--keep-alive]
//! ```
//!
//! A frames directory holds `rgb/NNNN.png` (RGBA or RGB) and
//! `depth/NNNN.png` (16-bit, depth scale units). A poses directory holds
//! `NNNN.txt` camera-to-world poses as twelve numbers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use image::{ImageBuffer, Luma, Rgba, RgbaImage};

use rkfusion::core::error::Error;
use rkfusion::core::logging;
use rkfusion::core::types::{Mat3, Result, UVec2, Vec3};
use rkfusion::debug::EngineDebugHandler;
use rkfusion::engine::{FrameReport, FusionEngine};
use rkfusion::math::Pose;
use rkfusion::tracking::PoseSeed;
use rkfusion::view::{DepthInput, Intrinsics, RgbdCalib};
use rkfusion::core::config::FusionSettings;

fn main() {
    logging::init();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let settings = match arg_value(args, "--settings") {
        Some(path) => FusionSettings::from_json_file(path)?,
        None => FusionSettings::default(),
    };
    let frames_dir = arg_value(args, "--frames").map(PathBuf::from);
    let (calib, size) = match arg_value(args, "--calib") {
        Some(path) => {
            let calib = RgbdCalib::from_json_file(path)?;
            let size = match &frames_dir {
                Some(dir) => recorded_size(dir)?,
                None => synthetic_size(),
            };
            (calib, size)
        }
        None => (RgbdCalib::aligned(synthetic_intrinsics()), synthetic_size()),
    };

    let engine = Arc::new(StdMutex::new(FusionEngine::new(settings, calib.clone(), size, size)?));
    if has_flag(args, "--debug") {
        let port = arg_value(args, "--port")
            .and_then(|p| p.parse().ok())
            .unwrap_or(rkfusion_debug::DEFAULT_PORT);
        start_debug_server(engine.clone(), port);
    }

    let poses_dir = arg_value(args, "--poses").map(PathBuf::from);
    match &frames_dir {
        Some(dir) => run_recorded(&engine, dir, poses_dir.as_deref())?,
        None => {
            let count = arg_value(args, "--synthetic").and_then(|n| n.parse().ok()).unwrap_or(60);
            run_synthetic(&engine, &calib.depth, size, count)?;
        }
    }

    {
        let engine = lock(&engine)?;
        if let Some(path) = arg_value(args, "--mesh") {
            let triangles = engine.save_scene_to_mesh(path)?;
            log::info!("Mesh: {} triangles", triangles);
        }
        if let Some(path) = arg_value(args, "--snapshot") {
            engine.save_snapshot(path)?;
        }
        let stats = engine.scene_stats();
        log::info!(
            "Done: {} frames, {} device blocks, {} archived, {:.1} fps",
            engine.frame_count(),
            stats.device_entries,
            stats.archived_entries,
            engine.timer().processing_fps()
        );
    }

    if has_flag(args, "--keep-alive") {
        log::info!("Keeping debug server alive, Ctrl-C to quit");
        loop {
            std::thread::sleep(std::time::Duration::from_secs(3600));
        }
    }
    Ok(())
}

/// Value following `flag`, e.g. `--mesh out.stl`
fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn lock(engine: &StdMutex<FusionEngine>) -> Result<std::sync::MutexGuard<'_, FusionEngine>> {
    engine
        .lock()
        .map_err(|_| Error::Config("engine lock poisoned".into()))
}

/// Serve the debug protocol from a background thread with its own runtime
fn start_debug_server(engine: Arc<StdMutex<FusionEngine>>, port: u16) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            let handler = Arc::new(tokio::sync::Mutex::new(EngineDebugHandler::new(engine)));
            let _server = rkfusion_debug::DebugServer::start(handler, port);
            // Keep runtime alive forever
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        });
    });
}

fn log_report(report: &FrameReport) {
    if report.frame_index % 30 == 0 {
        log::info!(
            "Frame {}: {:?}, {} visible blocks, {} in / {} out, {:.1} ms",
            report.frame_index,
            report.tracking_status,
            report.visible_blocks,
            report.swap.swapped_in,
            report.swap.swapped_out,
            report.timings.total_ms()
        );
    }
}

// ---------------------------------------------------------------------------
// Recorded frames
// ---------------------------------------------------------------------------

fn frame_path(dir: &Path, sub: &str, index: usize, ext: &str) -> PathBuf {
    dir.join(sub).join(format!("{:04}.{}", index, ext))
}

fn recorded_size(dir: &Path) -> Result<UVec2> {
    let path = frame_path(dir, "depth", 0, "png");
    let (w, h) = image::image_dimensions(&path).map_err(|e| Error::Input(format!("{}: {}", path.display(), e)))?;
    Ok(UVec2::new(w, h))
}

fn run_recorded(engine: &StdMutex<FusionEngine>, dir: &Path, poses: Option<&Path>) -> Result<()> {
    let mut index = 0;
    loop {
        let rgb_path = frame_path(dir, "rgb", index, "png");
        let depth_path = frame_path(dir, "depth", index, "png");
        if !rgb_path.exists() || !depth_path.exists() {
            break;
        }
        let rgb = image::open(&rgb_path)
            .map_err(|e| Error::Input(format!("{}: {}", rgb_path.display(), e)))?
            .to_rgba8();
        let depth = image::open(&depth_path)
            .map_err(|e| Error::Input(format!("{}: {}", depth_path.display(), e)))?
            .to_luma16();
        let seed = match poses {
            Some(poses) => Some(PoseSeed::parse(&std::fs::read_to_string(poses.join(format!("{:04}.txt", index)))?)?),
            None => None,
        };

        let report = lock(engine)?.process_frame(&rgb, &DepthInput::Millimeters(&depth), None, seed.as_ref())?;
        log_report(&report);
        index += 1;
    }
    if index == 0 {
        return Err(Error::Input(format!("no frames found in {}", dir.display())));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Synthetic sequence
// ---------------------------------------------------------------------------

fn synthetic_size() -> UVec2 {
    UVec2::new(160, 120)
}

fn synthetic_intrinsics() -> Intrinsics {
    Intrinsics::new(150.0, 150.0, 80.0, 60.0)
}

/// Camera sliding sideways past a sphere in front of a wall and floor
fn synthetic_camera(frame: usize) -> (Mat3, Vec3) {
    let t = frame as f32 * 0.05;
    let yaw = 0.15 * t.sin();
    (Mat3::from_rotation_y(yaw), Vec3::new(0.2 * t.sin(), 0.0, 0.05 * t.cos()))
}

/// Nearest positive hit of a camera ray with the synthetic scene
fn synthetic_hit(origin: Vec3, dir: Vec3) -> Option<(f32, [u8; 3])> {
    let mut best: Option<(f32, [u8; 3])> = None;
    let mut consider = |t: f32, color: [u8; 3]| {
        if t > 0.0 && best.map_or(true, |(b, _)| t < b) {
            best = Some((t, color));
        }
    };

    // Wall z = 2.5, floor y = 0.5 (y points down)
    if dir.z.abs() > 1e-6 {
        consider((2.5 - origin.z) / dir.z, [200, 200, 180]);
    }
    if dir.y.abs() > 1e-6 {
        consider((0.5 - origin.y) / dir.y, [120, 90, 60]);
    }

    let center = Vec3::new(0.0, 0.1, 1.8);
    let radius = 0.3;
    let oc = origin - center;
    let b = oc.dot(dir);
    let disc = b * b - (oc.length_squared() - radius * radius);
    if disc >= 0.0 {
        consider(-b - disc.sqrt(), [200, 60, 60]);
    }
    best
}

fn synthetic_frame(k: &Intrinsics, size: UVec2, rotation: Mat3, translation: Vec3) -> (RgbaImage, ImageBuffer<Luma<u16>, Vec<u16>>) {
    let mut rgb = RgbaImage::new(size.x, size.y);
    let mut depth = ImageBuffer::new(size.x, size.y);
    for y in 0..size.y {
        for x in 0..size.x {
            let ray = k.unproject(x as f32, y as f32, 1.0);
            let dir = rotation * ray.normalize();
            if let Some((t, c)) = synthetic_hit(translation, dir) {
                let z = t * ray.normalize().z;
                depth.put_pixel(x, y, Luma([(z * 1000.0).round() as u16]));
                rgb.put_pixel(x, y, Rgba([c[0], c[1], c[2], 255]));
            }
        }
    }
    (rgb, depth)
}

fn run_synthetic(engine: &StdMutex<FusionEngine>, k: &Intrinsics, size: UVec2, count: usize) -> Result<()> {
    log::info!("Fusing {} synthetic frames at {}x{}", count, size.x, size.y);
    for frame in 0..count {
        let (rotation, translation) = synthetic_camera(frame);
        let (rgb, depth) = synthetic_frame(k, size, rotation, translation);
        let report = lock(engine)?.process_frame(&rgb, &DepthInput::Millimeters(&depth), None, None)?;
        log_report(&report);

        if frame % 30 == 29 {
            let truth = Pose::from_camera_to_world(rotation, translation);
            let (angle, dist) = report.pose.distance(&truth);
            log::info!("Drift after {} frames: {:.3} rad, {:.3} m", frame + 1, angle, dist);
        }
    }
    Ok(())
}
