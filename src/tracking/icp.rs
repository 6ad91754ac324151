//! Projective point-to-plane ICP against the raycast reference surface.
//!
//! Live depth pixels are moved into the world with the current pose
//! estimate, projected into the reference raycast and paired with the
//! point and normal found there. Each Gauss-Newton step solves a 6x6
//! system for a world-frame twist applied to the camera-to-world pose.
//! Iterations run coarse to fine over a depth pyramid.

use crate::backend::Dispatch;
use crate::core::config::TrackerSettings;
use crate::core::types::Vec3;
use crate::math::Pose;
use crate::view::{ImageMap, Intrinsics, View};
use super::state::{Tracker, TrackingQuality, TrackingState};

/// Fewer correspondences than this leave the pose untouched
const MIN_CORRESPONDENCES: u32 = 12;

/// Normal equations of one Gauss-Newton step, accumulated in f64
#[derive(Clone, Copy, Debug, Default)]
struct NormalEquations {
    /// Upper triangle of J^T J
    h: [[f64; 6]; 6],
    g: [f64; 6],
    sum_sq: f64,
    inliers: u32,
    /// Live pixels with valid depth
    valid: u32,
}

impl NormalEquations {
    #[inline]
    fn add(&mut self, row: [f64; 6], b: f64) {
        for i in 0..6 {
            self.g[i] += row[i] * b;
            for j in i..6 {
                self.h[i][j] += row[i] * row[j];
            }
        }
        self.sum_sq += b * b;
        self.inliers += 1;
    }

    fn merge(mut self, other: &NormalEquations) -> NormalEquations {
        for i in 0..6 {
            self.g[i] += other.g[i];
            for j in i..6 {
                self.h[i][j] += other.h[i][j];
            }
        }
        self.sum_sq += other.sum_sq;
        self.inliers += other.inliers;
        self.valid += other.valid;
        self
    }

    fn solve(&self) -> Option<[f64; 6]> {
        let mut h = self.h;
        for i in 0..6 {
            for j in 0..i {
                h[i][j] = h[j][i];
            }
        }
        solve_cholesky6(&h, &self.g)
    }

    fn quality(&self) -> TrackingQuality {
        if self.valid == 0 || self.inliers == 0 {
            return TrackingQuality {
                inlier_fraction: 0.0,
                residual: f32::INFINITY,
            };
        }
        TrackingQuality {
            inlier_fraction: self.inliers as f32 / self.valid as f32,
            residual: (self.sum_sq / self.inliers as f64).sqrt() as f32,
        }
    }
}

/// Solve `h x = g` for a symmetric positive definite 6x6 `h`.
/// `None` when `h` is singular or indefinite.
pub fn solve_cholesky6(h: &[[f64; 6]; 6], g: &[f64; 6]) -> Option<[f64; 6]> {
    let mut l = [[0.0f64; 6]; 6];
    for i in 0..6 {
        for j in 0..=i {
            let mut sum = h[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 1e-12 {
                    return None;
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut y = [0.0f64; 6];
    for i in 0..6 {
        let mut s = g[i];
        for k in 0..i {
            s -= l[i][k] * y[k];
        }
        y[i] = s / l[i][i];
    }
    let mut x = [0.0f64; 6];
    for i in (0..6).rev() {
        let mut s = y[i];
        for k in i + 1..6 {
            s -= l[k][i] * x[k];
        }
        x[i] = s / l[i][i];
    }
    Some(x)
}

/// Halve resolution, averaging only valid (positive) depths
pub fn downsample_with_holes(src: &ImageMap<f32>) -> ImageMap<f32> {
    ImageMap::from_fn(src.width() / 2, src.height() / 2, |x, y| {
        let mut sum = 0.0;
        let mut n = 0;
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let d = *src.get(2 * x + dx, 2 * y + dy);
            if d > 0.0 {
                sum += d;
                n += 1;
            }
        }
        if n > 0 { sum / n as f32 } else { 0.0 }
    })
}

/// Depth ICP tracker
pub struct DepthIcpTracker {
    settings: TrackerSettings,
    dispatch: Dispatch,
}

impl DepthIcpTracker {
    pub fn new(settings: TrackerSettings, dispatch: Dispatch) -> Self {
        Self { settings, dispatch }
    }

    fn accumulate(
        &self,
        depth: &ImageMap<f32>,
        k: &Intrinsics,
        camera_to_world: &Pose,
        state: &TrackingState,
        reference_k: &Intrinsics,
    ) -> NormalEquations {
        let outlier_sq = self.settings.outlier_distance * self.settings.outlier_distance;
        let rows = self.dispatch.map(depth.height() as usize, |y| {
            let mut eq = NormalEquations::default();
            for (x, &d) in depth.row(y as u32).iter().enumerate() {
                if d <= 0.0 {
                    continue;
                }
                eq.valid += 1;
                let p = camera_to_world.transform_point(k.unproject(x as f32, y as f32, d));
                let Some((q, n)) = correspondence(state, reference_k, p) else {
                    continue;
                };
                let diff = q - p;
                if diff.length_squared() > outlier_sq {
                    continue;
                }
                let a = p.cross(n);
                let row = [a.x, a.y, a.z, n.x, n.y, n.z].map(f64::from);
                eq.add(row, n.dot(diff) as f64);
            }
            eq
        });
        // Row order reduction keeps results independent of thread count
        rows.iter().fold(NormalEquations::default(), |acc, r| acc.merge(r))
    }
}

/// Reference point and normal seen at the pixel `p` projects to
fn correspondence(state: &TrackingState, k: &Intrinsics, p: Vec3) -> Option<(Vec3, Vec3)> {
    let p_ref = state.pose_point_cloud.transform_point(p);
    if p_ref.z <= 0.0 {
        return None;
    }
    let uv = k.project(p_ref);
    let (u, v) = ((uv.x + 0.5).floor() as i32, (uv.y + 0.5).floor() as i32);
    let q = state.point_cloud.try_get(u, v)?;
    let n = state.normals.try_get(u, v)?;
    if q.w <= 0.0 || n.w <= 0.0 {
        return None;
    }
    Some((q.truncate(), n.truncate()))
}

impl Tracker for DepthIcpTracker {
    fn track(&mut self, state: &mut TrackingState, view: &View) -> TrackingQuality {
        let iterations = self.settings.iterations_coarse_to_fine.clone();
        let levels = iterations.len();
        let mut pyramid: Vec<ImageMap<f32>> = Vec::with_capacity(levels.saturating_sub(1));
        for level in 1..levels {
            let finer = if level == 1 { &view.depth } else { &pyramid[level - 2] };
            let coarser = downsample_with_holes(finer);
            pyramid.push(coarser);
        }

        let reference_k = view.calib.depth;
        let mut camera_to_world = state.pose_d.inverse();
        for (i, &count) in iterations.iter().enumerate() {
            let level = levels - 1 - i;
            let depth = if level == 0 { &view.depth } else { &pyramid[level - 1] };
            let k = view.calib.depth.at_level(level);
            for _ in 0..count {
                let eq = self.accumulate(depth, &k, &camera_to_world, state, &reference_k);
                if eq.inliers < MIN_CORRESPONDENCES {
                    break;
                }
                let Some(xi) = eq.solve() else {
                    log::debug!("ICP: singular system at level {}", level);
                    break;
                };
                camera_to_world = camera_to_world.apply_twist(&xi.map(|v| v as f32));
                let norm = xi.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm < self.settings.convergence_threshold as f64 {
                    break;
                }
            }
        }

        state.pose_d = camera_to_world.inverse();
        let quality = self
            .accumulate(&view.depth, &view.calib.depth, &camera_to_world, state, &reference_k)
            .quality();
        log::debug!(
            "ICP: {:.1}% inliers, residual {:.4} m",
            quality.inlier_fraction * 100.0,
            quality.residual
        );
        quality
    }

    fn requires_reference(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "depth_icp"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::types::{Mat3, UVec2, Vec3};
    use crate::view::RgbdCalib;

    pub(crate) const SIZE: UVec2 = UVec2::new(80, 60);

    pub(crate) fn camera() -> Intrinsics {
        Intrinsics::new(60.0, 60.0, 40.0, 30.0)
    }

    /// Inside corner of three walls: back z = 3, right x = 1, floor y = 0.8
    fn trace_corner(origin: Vec3, dir: Vec3) -> Option<(Vec3, Vec3)> {
        let walls = [(2usize, 3.0f32, Vec3::NEG_Z), (0, 1.0, Vec3::NEG_X), (1, 0.8, Vec3::NEG_Y)];
        let mut best: Option<(f32, Vec3)> = None;
        for (axis, offset, normal) in walls {
            if dir[axis] <= 1e-6 {
                continue;
            }
            let t = (offset - origin[axis]) / dir[axis];
            if t > 0.0 && best.map_or(true, |(bt, _)| t < bt) {
                best = Some((t, normal));
            }
        }
        best.map(|(t, n)| (origin + dir * t, n))
    }

    /// Depth image of the corner seen from `camera_to_world`
    pub(crate) fn corner_view(camera_to_world: &Pose) -> View {
        let k = camera();
        let mut view = View::new(RgbdCalib::aligned(k), SIZE, SIZE, false);
        for y in 0..SIZE.y {
            for x in 0..SIZE.x {
                let dir = camera_to_world.transform_vector(k.unproject(x as f32, y as f32, 1.0));
                if let Some((p, _)) = trace_corner(camera_to_world.t, dir) {
                    // Unnormalized ray with z = 1 in camera space: t is depth
                    let depth = camera_to_world.inverse().transform_point(p).z;
                    view.depth.set(x, y, depth);
                }
            }
        }
        view
    }

    /// Tracking state whose reference is the corner seen from the origin
    pub(crate) fn corner_reference() -> TrackingState {
        let k = camera();
        let mut state = TrackingState::new(SIZE);
        for y in 0..SIZE.y {
            for x in 0..SIZE.x {
                if let Some((p, n)) = trace_corner(Vec3::ZERO, k.unproject(x as f32, y as f32, 1.0)) {
                    state.point_cloud.set(x, y, p.extend(1.0));
                    state.normals.set(x, y, n.extend(1.0));
                }
            }
        }
        state.age_point_cloud = Some(0);
        state
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let mut h = [[0.0f64; 6]; 6];
        for i in 0..6 {
            h[i][i] = 4.0 + i as f64;
            if i + 1 < 6 {
                h[i][i + 1] = 1.0;
                h[i + 1][i] = 1.0;
            }
        }
        let x_true = [1.0, -2.0, 0.5, 3.0, 0.0, -1.0];
        let mut g = [0.0f64; 6];
        for i in 0..6 {
            g[i] = (0..6).map(|j| h[i][j] * x_true[j]).sum();
        }
        let x = solve_cholesky6(&h, &g).unwrap();
        for i in 0..6 {
            assert!((x[i] - x_true[i]).abs() < 1e-9);
        }
        assert!(solve_cholesky6(&[[0.0; 6]; 6], &g).is_none());
    }

    #[test]
    fn test_downsample_ignores_holes() {
        let src = ImageMap::from_vec(2, 2, vec![1.0, 0.0, 3.0, 0.0]).unwrap();
        let half = downsample_with_holes(&src);
        assert_eq!(*half.get(0, 0), 2.0);
        let empty = downsample_with_holes(&ImageMap::new(2, 2, 0.0));
        assert_eq!(*empty.get(0, 0), 0.0);
    }

    #[test]
    fn test_recovers_small_motion() {
        let truth = Pose::from_rt(Mat3::from_rotation_y(0.01), Vec3::new(0.02, -0.01, 0.03));
        let view = corner_view(&truth);
        let mut state = corner_reference();

        let mut tracker = DepthIcpTracker::new(TrackerSettings::default(), Dispatch::Serial);
        let quality = tracker.track(&mut state, &view);

        let expected = truth.inverse();
        let (angle, dist) = state.pose_d.distance(&expected);
        assert!(angle < 2e-3, "angle error {angle}");
        assert!(dist < 2e-3, "translation error {dist}");
        assert!(quality.is_good(&TrackerSettings::default()), "{quality:?}");
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let truth = Pose::from_rt(Mat3::from_rotation_x(-0.008), Vec3::new(-0.015, 0.0, 0.02));
        let view = corner_view(&truth);
        let mut serial_state = corner_reference();
        let mut parallel_state = corner_reference();
        DepthIcpTracker::new(TrackerSettings::default(), Dispatch::Serial).track(&mut serial_state, &view);
        DepthIcpTracker::new(TrackerSettings::default(), Dispatch::Parallel).track(&mut parallel_state, &view);
        assert_eq!(serial_state.pose_d, parallel_state.pose_d);
    }

    #[test]
    fn test_no_reference_is_poor_quality() {
        let view = corner_view(&Pose::IDENTITY);
        let mut state = TrackingState::new(SIZE);
        let mut tracker = DepthIcpTracker::new(TrackerSettings::default(), Dispatch::Serial);
        let quality = tracker.track(&mut state, &view);
        assert_eq!(quality.inlier_fraction, 0.0);
        assert_eq!(state.pose_d, Pose::IDENTITY);
    }
}
