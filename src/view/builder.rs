//! Per-frame view building: depth conversion, filtering, normals and
//! sensor-noise uncertainty.
//!
//! Every kernel here works on one output row so a back-end can run rows
//! serially or in parallel.

use image::{ImageBuffer, Luma, RgbaImage};

use crate::backend::Dispatch;
use crate::core::error::Error;
use crate::core::types::{Result, UVec2, Vec3, Vec4};
use super::calib::{Intrinsics, RgbdCalib};
use super::image::ImageMap;

/// Depth image as delivered by the acquisition side
#[derive(Clone, Copy, Debug)]
pub enum DepthInput<'a> {
    /// Integer depth in units of `RgbdCalib::depth_scale` (1 mm by default)
    Millimeters(&'a ImageBuffer<Luma<u16>, Vec<u16>>),
    /// Raw Kinect-style disparity
    Disparity(&'a ImageBuffer<Luma<u16>, Vec<u16>>),
    /// Metric depth
    Meters(&'a ImageBuffer<Luma<f32>, Vec<f32>>),
}

impl DepthInput<'_> {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            DepthInput::Millimeters(img) | DepthInput::Disparity(img) => img.dimensions(),
            DepthInput::Meters(img) => img.dimensions(),
        }
    }

    /// Metric depth at a pixel, 0.0 when invalid
    #[inline]
    fn meters_at(&self, x: u32, y: u32, calib: &RgbdCalib) -> f32 {
        let d = match self {
            DepthInput::Millimeters(img) => img.get_pixel(x, y).0[0] as f32 * calib.depth_scale,
            DepthInput::Disparity(img) => calib.disparity.to_depth(img.get_pixel(x, y).0[0], calib.depth.fx),
            DepthInput::Meters(img) => img.get_pixel(x, y).0[0],
        };
        if d.is_finite() && d > 0.0 { d } else { 0.0 }
    }
}

/// Per-frame input bundle, rebuilt in place every frame
#[derive(Clone, Debug)]
pub struct View {
    pub rgb: RgbaImage,
    /// Metric depth, <= 0 means invalid
    pub depth: ImageMap<f32>,
    /// Camera-space normals, w = 1 valid / -1 invalid
    pub depth_normals: Option<ImageMap<Vec4>>,
    /// Per-pixel depth standard deviation (meters), -1 invalid
    pub depth_uncertainty: Option<ImageMap<f32>>,
    pub calib: RgbdCalib,
}

impl View {
    pub fn new(calib: RgbdCalib, rgb_size: UVec2, depth_size: UVec2, model_sensor_noise: bool) -> Self {
        Self {
            rgb: RgbaImage::new(rgb_size.x, rgb_size.y),
            depth: ImageMap::new(depth_size.x, depth_size.y, 0.0),
            depth_normals: model_sensor_noise.then(|| ImageMap::new(depth_size.x, depth_size.y, Vec4::new(0.0, 0.0, 0.0, -1.0))),
            depth_uncertainty: model_sensor_noise.then(|| ImageMap::new(depth_size.x, depth_size.y, -1.0)),
            calib,
        }
    }

    pub fn rgb_size(&self) -> UVec2 {
        UVec2::new(self.rgb.width(), self.rgb.height())
    }

    pub fn depth_size(&self) -> UVec2 {
        self.depth.dims()
    }

    /// Check incoming images against the sizes this view was built for
    pub fn check_input(&self, rgb: &RgbaImage, depth: &DepthInput<'_>) -> Result<()> {
        if rgb.dimensions() != (self.rgb.width(), self.rgb.height()) {
            return Err(Error::Input(format!(
                "rgb image is {:?}, expected {}x{}",
                rgb.dimensions(),
                self.rgb.width(),
                self.rgb.height()
            )));
        }
        if depth.dimensions() != (self.depth.width(), self.depth.height()) {
            return Err(Error::Input(format!(
                "depth image is {:?}, expected {}x{}",
                depth.dimensions(),
                self.depth.width(),
                self.depth.height()
            )));
        }
        Ok(())
    }
}

/// Options for view building taken from the engine settings
#[derive(Clone, Copy, Debug)]
pub struct ViewOptions {
    pub use_bilateral_filter: bool,
    pub model_sensor_noise: bool,
    /// Readings outside [min, max] meters are marked invalid
    pub depth_range: (f32, f32),
}

/// Convert one row of raw depth to meters
pub fn convert_depth_row(input: &DepthInput<'_>, calib: &RgbdCalib, range: (f32, f32), y: u32, row: &mut [f32]) {
    for (x, out) in row.iter_mut().enumerate() {
        let d = input.meters_at(x as u32, y, calib);
        *out = if d >= range.0 && d <= range.1 { d } else { 0.0 };
    }
}

const FILTER_RADIUS: i32 = 2;
const FILTER_SIGMA_SPACE: f32 = 2.5;
const FILTER_SIGMA_DEPTH: f32 = 0.025;

/// One row of a 5x5 edge-preserving bilateral filter. Invalid pixels stay
/// invalid and never contribute.
pub fn bilateral_filter_row(src: &ImageMap<f32>, y: u32, row: &mut [f32]) {
    let inv_space = 1.0 / (2.0 * FILTER_SIGMA_SPACE * FILTER_SIGMA_SPACE);
    let inv_depth = 1.0 / (2.0 * FILTER_SIGMA_DEPTH * FILTER_SIGMA_DEPTH);
    for (x, out) in row.iter_mut().enumerate() {
        let center = *src.get(x as u32, y);
        if center <= 0.0 {
            *out = 0.0;
            continue;
        }
        let mut sum = 0.0;
        let mut weight = 0.0;
        for dy in -FILTER_RADIUS..=FILTER_RADIUS {
            for dx in -FILTER_RADIUS..=FILTER_RADIUS {
                let Some(&d) = src.try_get(x as i32 + dx, y as i32 + dy) else {
                    continue;
                };
                if d <= 0.0 {
                    continue;
                }
                let space = (dx * dx + dy * dy) as f32 * inv_space;
                let range = (d - center) * (d - center) * inv_depth;
                let w = (-space - range).exp();
                sum += d * w;
                weight += w;
            }
        }
        *out = sum / weight;
    }
}

/// Camera-space point at a depth pixel, `None` if invalid
#[inline]
fn point_at(depth: &ImageMap<f32>, k: &Intrinsics, x: i32, y: i32) -> Option<Vec3> {
    let d = *depth.try_get(x, y)?;
    (d > 0.0).then(|| k.unproject(x as f32, y as f32, d))
}

/// One row of camera-space normals from neighbor differences. Normals face
/// the camera.
pub fn normals_row(depth: &ImageMap<f32>, k: &Intrinsics, y: u32, row: &mut [Vec4]) {
    let y = y as i32;
    for (x, out) in row.iter_mut().enumerate() {
        let x = x as i32;
        *out = Vec4::new(0.0, 0.0, 0.0, -1.0);
        let (Some(right), Some(left), Some(down), Some(up)) = (
            point_at(depth, k, x + 1, y),
            point_at(depth, k, x - 1, y),
            point_at(depth, k, x, y + 1),
            point_at(depth, k, x, y - 1),
        ) else {
            continue;
        };
        if point_at(depth, k, x, y).is_none() {
            continue;
        }
        let n = (right - left).cross(down - up);
        let len = n.length();
        if len <= f32::EPSILON {
            continue;
        }
        let mut n = n / len;
        if n.z > 0.0 {
            n = -n;
        }
        *out = n.extend(1.0);
    }
}

/// Axial depth noise of a structured-light sensor at depth `z` and incidence
/// angle `theta` (radians)
#[inline]
pub fn depth_sigma(z: f32, theta: f32) -> f32 {
    let half_pi = std::f32::consts::FRAC_PI_2;
    let theta = theta.min(half_pi - 0.05);
    0.0012 + 0.0019 * (z - 0.4) * (z - 0.4) + 0.0001 / z.sqrt() * theta * theta / ((half_pi - theta) * (half_pi - theta))
}

/// One row of depth uncertainty from depth and normals
pub fn uncertainty_row(depth: &ImageMap<f32>, normals: &ImageMap<Vec4>, y: u32, row: &mut [f32]) {
    for (x, out) in row.iter_mut().enumerate() {
        let d = *depth.get(x as u32, y);
        let n = *normals.get(x as u32, y);
        *out = if d > 0.0 && n.w > 0.0 {
            let theta = (-n.z).clamp(-1.0, 1.0).acos();
            depth_sigma(d, theta)
        } else {
            -1.0
        };
    }
}

/// Rebuild `view` from a new frame: copy color, convert depth to meters,
/// optionally filter it, and model per-pixel sensor noise.
pub fn build_view(
    dispatch: Dispatch,
    view: &mut View,
    rgb: &RgbaImage,
    depth: &DepthInput<'_>,
    options: &ViewOptions,
) -> Result<()> {
    view.check_input(rgb, depth)?;
    view.rgb.copy_from_slice(rgb.as_raw());

    let width = view.depth.width() as usize;
    let calib = view.calib.clone();
    dispatch.rows(view.depth.data_mut(), width, |y, row| {
        convert_depth_row(depth, &calib, options.depth_range, y, row);
    });

    if options.use_bilateral_filter {
        let raw = view.depth.clone();
        dispatch.rows(view.depth.data_mut(), width, |y, row| bilateral_filter_row(&raw, y, row));
    }

    if options.model_sensor_noise {
        let size = view.depth.dims();
        let normals = view
            .depth_normals
            .get_or_insert_with(|| ImageMap::new(size.x, size.y, Vec4::new(0.0, 0.0, 0.0, -1.0)));
        let depth_map = &view.depth;
        dispatch.rows(normals.data_mut(), width, |y, row| normals_row(depth_map, &calib.depth, y, row));
        let normals: &ImageMap<Vec4> = normals;

        let uncertainty = view
            .depth_uncertainty
            .get_or_insert_with(|| ImageMap::new(size.x, size.y, -1.0));
        dispatch.rows(uncertainty.data_mut(), width, |y, row| uncertainty_row(depth_map, normals, y, row));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millimeter_conversion_and_range() {
        let raw = ImageBuffer::from_raw(4, 1, vec![0u16, 1500, 100, 5000]).unwrap();
        let calib = RgbdCalib::default();
        let mut row = vec![0.0; 4];
        convert_depth_row(&DepthInput::Millimeters(&raw), &calib, (0.2, 3.0), 0, &mut row);
        assert_eq!(row[0], 0.0);
        assert!((row[1] - 1.5).abs() < 1e-6);
        // Too near and too far are both invalid
        assert_eq!(row[2], 0.0);
        assert_eq!(row[3], 0.0);
    }

    #[test]
    fn test_meters_rejects_nan() {
        let raw = ImageBuffer::from_raw(2, 1, vec![f32::NAN, 1.25f32]).unwrap();
        let mut row = vec![9.0; 2];
        convert_depth_row(&DepthInput::Meters(&raw), &RgbdCalib::default(), (0.0, 10.0), 0, &mut row);
        assert_eq!(row, vec![0.0, 1.25]);
    }

    #[test]
    fn test_bilateral_keeps_flat_depth_and_holes() {
        let mut src = ImageMap::new(7, 7, 2.0f32);
        src.set(3, 3, 0.0);
        let mut row = vec![0.0; 7];
        bilateral_filter_row(&src, 2, &mut row);
        for d in &row {
            assert!((d - 2.0).abs() < 1e-5);
        }
        bilateral_filter_row(&src, 3, &mut row);
        assert_eq!(row[3], 0.0);
    }

    #[test]
    fn test_frontal_plane_normal_faces_camera() {
        let k = Intrinsics::new(100.0, 100.0, 4.0, 4.0);
        let depth = ImageMap::new(9, 9, 1.5f32);
        let mut row = vec![Vec4::ZERO; 9];
        normals_row(&depth, &k, 4, &mut row);
        let n = row[4];
        assert_eq!(n.w, 1.0);
        assert!((n.truncate() - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
        // Border pixels lack neighbors
        assert_eq!(row[0].w, -1.0);
    }

    #[test]
    fn test_noise_grows_with_depth_and_angle() {
        assert!(depth_sigma(3.0, 0.0) > depth_sigma(1.0, 0.0));
        assert!(depth_sigma(1.0, 1.2) > depth_sigma(1.0, 0.1));
        assert!((depth_sigma(0.4, 0.0) - 0.0012).abs() < 1e-7);
    }

    #[test]
    fn test_check_input_size_mismatch() {
        let view = View::new(RgbdCalib::default(), UVec2::new(4, 4), UVec2::new(4, 4), false);
        let rgb = RgbaImage::new(4, 4);
        let depth = ImageBuffer::from_raw(3, 4, vec![0u16; 12]).unwrap();
        let err = view.check_input(&rgb, &DepthInput::Millimeters(&depth));
        assert!(matches!(err, Err(Error::Input(_))));
    }

    #[test]
    fn test_build_view_converts_and_models_noise() {
        let k = Intrinsics::new(10.0, 10.0, 4.0, 3.0);
        let size = UVec2::new(8, 6);
        let mut view = View::new(RgbdCalib::aligned(k), size, size, false);
        let rgb = RgbaImage::from_pixel(8, 6, image::Rgba([10, 20, 30, 255]));
        let raw = ImageBuffer::from_pixel(8, 6, Luma([1500u16]));
        let options = ViewOptions {
            use_bilateral_filter: true,
            model_sensor_noise: true,
            depth_range: (0.2, 3.0),
        };
        build_view(Dispatch::Parallel, &mut view, &rgb, &DepthInput::Millimeters(&raw), &options).unwrap();

        assert_eq!(view.rgb.get_pixel(3, 3).0, [10, 20, 30, 255]);
        assert!((*view.depth.get(3, 3) - 1.5).abs() < 1e-5);
        let n = *view.depth_normals.as_ref().unwrap().get(3, 3);
        assert!((n.truncate() - Vec3::NEG_Z).length() < 1e-4);
        let sigma = *view.depth_uncertainty.as_ref().unwrap().get(3, 3);
        assert!((sigma - depth_sigma(1.5, 0.0)).abs() < 1e-5);
    }
}
