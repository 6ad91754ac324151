//! Per-block residency state

use serde::Serialize;

use crate::core::types::IVec3;
use crate::voxel::{EntryPtr, Scene};
use super::swap::SwapManager;

/// Where a block's authoritative content lives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Residency {
    /// Address never allocated
    Unallocated,
    /// In a device pool slot
    Device,
    /// Only in the host archive
    HostOnly,
    /// Part of a staged transfer that has not been committed
    InTransit,
}

/// Residency of the block at `addr`
pub fn residency(scene: &Scene, swap: Option<&SwapManager>, addr: IVec3) -> Residency {
    let Some(entry) = scene.find_entry(addr) else {
        return Residency::Unallocated;
    };
    if swap.is_some_and(|s| s.is_in_transit(entry)) {
        return Residency::InTransit;
    }
    match scene.entry(entry).ptr {
        EntryPtr::Slot(_) => Residency::Device,
        EntryPtr::Archived => Residency::HostOnly,
        EntryPtr::Empty => Residency::Unallocated,
    }
}
