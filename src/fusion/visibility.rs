//! Per-frame visibility list

use crate::core::types::UVec2;
use crate::math::{Aabb, Frustum, Pose};
use crate::view::calib::Intrinsics;
use crate::voxel::Scene;

/// How a visible entry got onto the list
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VisibleKind {
    /// Visible last frame, not touched this frame, still inside the
    /// (enlarged) frustum
    StillVisible,
    /// Touched by this frame's depth and device resident
    Resident,
    /// Touched by this frame's depth but archived on host
    NeedsSwapIn,
}

/// Hash-entry ids visible this frame, sorted and unique
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityList {
    entries: Vec<u32>,
    kinds: Vec<VisibleKind>,
}

impl VisibilityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from unordered (entry, kind) pairs. Duplicates keep the
    /// strongest kind.
    pub fn from_pairs(mut pairs: Vec<(u32, VisibleKind)>) -> Self {
        pairs.sort_unstable();
        let mut list = Self::default();
        for (entry, kind) in pairs {
            if list.entries.last() == Some(&entry) {
                if let Some(last) = list.kinds.last_mut() {
                    *last = (*last).max(kind);
                }
            } else {
                list.entries.push(entry);
                list.kinds.push(kind);
            }
        }
        list
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.kinds.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, VisibleKind)> + '_ {
        self.entries.iter().copied().zip(self.kinds.iter().copied())
    }

    pub fn contains(&self, entry: u32) -> bool {
        self.entries.binary_search(&entry).is_ok()
    }

    pub fn kind(&self, entry: u32) -> Option<VisibleKind> {
        self.entries.binary_search(&entry).ok().map(|i| self.kinds[i])
    }

    /// Entries of one kind
    pub fn of_kind(&self, kind: VisibleKind) -> impl Iterator<Item = u32> + '_ {
        self.iter().filter(move |(_, k)| *k == kind).map(|(e, _)| e)
    }

    /// Change the kind of an entry already on the list
    pub fn set_kind(&mut self, entry: u32, kind: VisibleKind) {
        if let Ok(i) = self.entries.binary_search(&entry) {
            self.kinds[i] = kind;
        }
    }
}

/// Camera setup a visibility test runs against
#[derive(Clone, Copy, Debug)]
pub struct ViewFrustum {
    pub pose: Pose,
    pub intrinsics: Intrinsics,
    pub size: UVec2,
    pub near: f32,
    pub far: f32,
    pub margin_px: f32,
}

impl ViewFrustum {
    pub fn frustum(&self) -> Frustum {
        Frustum::from_intrinsics(
            &self.intrinsics,
            self.size.x,
            self.size.y,
            &self.pose,
            self.near,
            self.far,
            self.margin_px,
        )
    }
}

/// Every device-resident block intersecting the frustum, in entry order.
/// Used by free-viewpoint renders that have no depth of their own.
pub fn find_visible_blocks(scene: &Scene, view: &ViewFrustum) -> Vec<u32> {
    let frustum = view.frustum();
    let block_size = scene.params().block_size_meters();
    scene
        .hash()
        .iter_live()
        .filter(|(_, e)| e.ptr.slot().is_some())
        .filter(|(_, e)| frustum.intersects_aabb(&Aabb::from_block(e.pos, block_size)))
        .map(|(id, _)| id)
        .collect()
}
