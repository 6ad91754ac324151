//! Compute back-ends
//!
//! Every per-frame stage runs through [`ComputeBackend`]. The host
//! back-ends share one implementation of each kernel and differ only in
//! how loops are dispatched: [`SerialBackend`] runs them on the calling
//! thread, [`ParallelBackend`] spreads rows and blocks over rayon.

use image::RgbaImage;
use rayon::prelude::*;

use crate::core::config::DeviceType;
use crate::core::types::{Result, Vec4};
use crate::fusion::{self, AllocationParams, AllocationStats, VisibilityList};
use crate::math::Pose;
use crate::render::{self, RenderKind, RenderState};
use crate::streaming::{SwapManager, SwapStats};
use crate::view::{self, DepthInput, ImageMap, Intrinsics, View, ViewOptions};
use crate::voxel::Scene;

/// How a kernel loop is executed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Serial,
    Parallel,
}

impl Dispatch {
    /// Run `f(y, row)` over every `width`-long row of `data`
    pub fn rows<T: Send>(self, data: &mut [T], width: usize, f: impl Fn(u32, &mut [T]) + Sync) {
        if width == 0 {
            return;
        }
        match self {
            Dispatch::Serial => data
                .chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| f(y as u32, row)),
            Dispatch::Parallel => data
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| f(y as u32, row)),
        }
    }

    /// Run `f(index, item)` over every element
    pub fn for_each_mut<T: Send>(self, data: &mut [T], f: impl Fn(usize, &mut T) + Sync) {
        match self {
            Dispatch::Serial => data.iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
            Dispatch::Parallel => data.par_iter_mut().enumerate().for_each(|(i, v)| f(i, v)),
        }
    }

    /// Evaluate `f(i)` for `i in 0..n`, results in index order
    pub fn map<R: Send>(self, n: usize, f: impl Fn(usize) -> R + Sync) -> Vec<R> {
        match self {
            Dispatch::Serial => (0..n).map(f).collect(),
            Dispatch::Parallel => (0..n).into_par_iter().map(|i| f(i)).collect(),
        }
    }
}

/// The per-frame stages of the pipeline.
///
/// Chosen once at engine construction. Default methods run the shared
/// host kernels under [`ComputeBackend::dispatch`].
pub trait ComputeBackend: Send {
    fn name(&self) -> &'static str;

    /// Loop dispatch used by the default kernels
    fn dispatch(&self) -> Dispatch;

    fn build_view(&self, view: &mut View, rgb: &RgbaImage, depth: &DepthInput<'_>, options: &ViewOptions) -> Result<()> {
        view::build_view(self.dispatch(), view, rgb, depth, options)
    }

    fn allocate_and_find_visible(
        &self,
        scene: &mut Scene,
        view: &View,
        pose: &Pose,
        previous: &VisibilityList,
        params: &AllocationParams,
    ) -> (VisibilityList, AllocationStats) {
        fusion::allocate_and_find_visible(self.dispatch(), scene, view, pose, previous, params)
    }

    /// Apply this frame's host/device transfers. Must succeed before
    /// integration.
    fn swap(&self, swap: &mut SwapManager, scene: &mut Scene, visible: &VisibilityList) -> Result<SwapStats> {
        swap.swap(scene, visible)
    }

    fn integrate(&self, scene: &mut Scene, view: &View, pose: &Pose, visible: &VisibilityList) {
        fusion::integrate(self.dispatch(), scene, view, pose, visible)
    }

    fn create_expected_depths(&self, scene: &Scene, pose: &Pose, intrinsics: &Intrinsics, state: &mut RenderState) {
        render::create_expected_depths(self.dispatch(), scene, pose, intrinsics, state)
    }

    fn raycast(&self, scene: &Scene, pose: &Pose, intrinsics: &Intrinsics, state: &mut RenderState) {
        render::raycast(self.dispatch(), scene, pose, intrinsics, state)
    }

    fn render_image(&self, scene: &Scene, kind: RenderKind, state: &mut RenderState) {
        render::render_image(self.dispatch(), scene, kind, state)
    }

    fn create_icp_maps(&self, scene: &Scene, state: &RenderState, points: &mut ImageMap<Vec4>, normals: &mut ImageMap<Vec4>) {
        render::create_icp_maps(self.dispatch(), scene, state, points, normals)
    }
}

/// Single-threaded host back-end
#[derive(Debug, Default)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Serial
    }
}

/// rayon data-parallel host back-end
#[derive(Debug, Default)]
pub struct ParallelBackend;

impl ComputeBackend for ParallelBackend {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Parallel
    }
}

/// Back-end for a device type
pub fn create_backend(device: DeviceType) -> Box<dyn ComputeBackend> {
    let backend: Box<dyn ComputeBackend> = match device {
        DeviceType::Serial => Box::new(SerialBackend),
        DeviceType::Parallel => Box::new(ParallelBackend),
    };
    log::info!(
        "Compute back-end: {} ({} threads)",
        backend.name(),
        if device == DeviceType::Parallel { rayon::current_num_threads() } else { 1 }
    );
    backend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_visit_every_row_once() {
        for dispatch in [Dispatch::Serial, Dispatch::Parallel] {
            let mut data = vec![0u32; 12];
            dispatch.rows(&mut data, 4, |y, row| row.iter_mut().for_each(|v| *v += y + 1));
            assert_eq!(data, vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
        }
    }

    #[test]
    fn test_map_keeps_index_order() {
        let out = Dispatch::Parallel.map(1000, |i| i * 2);
        assert!(out.iter().enumerate().all(|(i, v)| *v == i * 2));
    }

    #[test]
    fn test_create_backend_matches_device() {
        assert_eq!(create_backend(DeviceType::Serial).dispatch(), Dispatch::Serial);
        assert_eq!(create_backend(DeviceType::Parallel).name(), "parallel");
    }
}
